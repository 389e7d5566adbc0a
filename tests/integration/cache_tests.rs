//! Tile cache integration tests.
//!
//! Tests verify:
//! - Repeated requests are served without decoding
//! - The byte budget bounds the cache and evicts least recently used tiles
//! - A zero budget disables caching
//! - Tiles older than their image are replaced

use std::sync::Arc;

use wsi_pyramid::cache::CacheEntry;
use wsi_pyramid::tile::{TileOrigin, TileService};

use super::test_utils::{epoch_plus, patterned_source, FULL_LADDER};

#[tokio::test]
async fn test_repeat_request_hits_cache() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    let first = service.get_tile("slide.svs", 2, 0).await.unwrap();
    let second = service.get_tile("slide.svs", 2, 0).await.unwrap();

    assert_eq!(first.origin, TileOrigin::Native);
    assert_eq!(second.origin, TileOrigin::Cache);
    assert!(Arc::ptr_eq(&first.record, &second.record));
    assert_eq!(source.read_count(), 1);
}

#[tokio::test]
async fn test_cache_size_accounts_for_entries() {
    let service = TileService::new(patterned_source("slide.svs", FULL_LADDER));

    let record = service.get_tile("slide.svs", 2, 0).await.unwrap().record;
    let key = record.key().to_string();

    let stats = service.cache_stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.size, record.size_contribution(&key));
    assert!(stats.size > record.data().len() + key.len());
}

#[tokio::test]
async fn test_budget_evicts_least_recently_used() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    // Room for one full tile but not two
    let service = TileService::with_capacity(source.clone(), 300_000, 10);

    service.get_tile("slide.svs", 2, 0).await.unwrap();
    service.get_tile("slide.svs", 2, 1).await.unwrap();

    let stats = service.cache_stats().await;
    assert_eq!(stats.entries, 1);
    assert!(stats.size <= stats.capacity);

    // Tile 1 survived, tile 0 was evicted
    source.reset_tracking();
    assert_eq!(
        service.get_tile("slide.svs", 2, 1).await.unwrap().origin,
        TileOrigin::Cache
    );
    assert_eq!(
        service.get_tile("slide.svs", 2, 0).await.unwrap().origin,
        TileOrigin::Native
    );
    assert_eq!(source.read_count(), 1);
}

#[tokio::test]
async fn test_oversized_tile_is_not_retained() {
    let service = TileService::with_capacity(patterned_source("slide.svs", FULL_LADDER), 1_000, 10);

    service.get_tile("slide.svs", 2, 0).await.unwrap();

    let stats = service.cache_stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn test_zero_budget_disables_cache() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::with_capacity(source.clone(), 0, 10);

    for _ in 0..3 {
        let response = service.get_tile("slide.svs", 2, 0).await.unwrap();
        assert_eq!(response.origin, TileOrigin::Native);
    }

    assert_eq!(source.read_count(), 3);
    assert_eq!(service.cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_clear_cache() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    service.get_tile("slide.svs", 1, 0).await.unwrap();
    service.get_tile("slide.svs", 1, 1).await.unwrap();
    assert_eq!(service.cache_stats().await.entries, 2);

    service.clear_cache().await;
    let stats = service.cache_stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.size, 0);

    assert_eq!(
        service.get_tile("slide.svs", 1, 0).await.unwrap().origin,
        TileOrigin::Native
    );
}

#[tokio::test]
async fn test_modified_image_refreshes_tiles() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    let before = service.get_tile("slide.svs", 0, 0).await.unwrap().record;

    source.touch("slide.svs", epoch_plus(5_000));
    source.reset_tracking();

    let after = service.get_tile("slide.svs", 0, 0).await.unwrap();
    assert_eq!(after.origin, TileOrigin::Native);
    assert_eq!(source.read_count(), 1);
    assert!(after.record.timestamp() > before.timestamp());
    assert_eq!(after.record.timestamp(), epoch_plus(5_000));

    // The stale entry was replaced, not duplicated
    assert_eq!(service.cache_stats().await.entries, 1);
}

#[tokio::test]
async fn test_concurrent_requests_for_distinct_tiles() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = Arc::new(TileService::new(source.clone()));

    let mut handles = Vec::new();
    for tile in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.get_tile("slide.svs", 2, tile).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.record.resolution(), 2);
    }

    assert_eq!(source.read_count(), 16);
    assert_eq!(service.cache_stats().await.entries, 16);
    assert_eq!(source.open_count(), 1);
}
