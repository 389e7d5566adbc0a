//! Tile service facade tests.
//!
//! Tests verify:
//! - Descriptors and cache statistics serialize for reporting
//! - Several images share one tile cache without colliding
//! - The resolver and compositor can be driven directly from a registry

use std::sync::Arc;

use wsi_pyramid::cache::CacheStats;
use wsi_pyramid::image::ImageRegistry;
use wsi_pyramid::tile::{RegionCompositor, TileCache, TileOrigin, TileResolver, TileService};
use wsi_pyramid::TileError;

use super::test_utils::{pattern_pixel, patterned_source, MockImage, MockSource, FULL_LADDER, SPARSE_LADDER};

#[tokio::test]
async fn test_pyramid_serializes_to_json() {
    let service = TileService::new(patterned_source("slide.svs", SPARSE_LADDER));

    let pyramid = service.pyramid("slide.svs").await.unwrap();
    let json = serde_json::to_value(&pyramid).unwrap();

    assert_eq!(json["tile_size"], 256);
    assert_eq!(json["native_dimensions"][1][0], 1000);
    assert_eq!(json["levels"].as_array().unwrap().len(), 4);
    assert_eq!(json["levels"][3]["downsample"], 4);
}

#[tokio::test]
async fn test_cache_stats_serialize() {
    let service = TileService::with_capacity(patterned_source("slide.svs", FULL_LADDER), 4096, 10);

    let stats = service.cache_stats().await;
    assert_eq!(
        stats,
        CacheStats {
            entries: 0,
            size: 0,
            capacity: 4096
        }
    );

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["capacity"], 4096);
}

#[tokio::test]
async fn test_origin_in_json() {
    let service = TileService::new(patterned_source("slide.svs", SPARSE_LADDER));

    let response = service.get_tile("slide.svs", 0, 0).await.unwrap();
    assert_eq!(serde_json::to_value(response.origin).unwrap(), "composed");
}

#[tokio::test]
async fn test_images_share_cache_without_collisions() {
    let source = MockSource::new()
        .with_image("a.svs", MockImage::new(FULL_LADDER))
        .with_image("b.svs", MockImage::new(&[(500, 400)]));
    let service = TileService::new(source.clone());

    let a = service.get_tile("a.svs", 1, 0).await.unwrap().record;
    let b = service.get_tile("b.svs", 1, 0).await.unwrap().record;

    assert_eq!(service.cache_stats().await.entries, 2);
    assert_ne!(a.key(), b.key());

    // Same request-facing coordinates, different native sources
    assert_eq!(&a.data()[..3], &pattern_pixel(1, 0, 0));
    assert_eq!(&b.data()[..3], &pattern_pixel(0, 0, 0));
}

#[tokio::test]
async fn test_open_failures_surface_from_every_operation() {
    let service = TileService::new(MockSource::new());

    let tile = service.get_tile("nope.svs", 0, 0).await.unwrap_err();
    let region = service.get_region("nope.svs", 0, 0, 0, 1, 1).await.unwrap_err();

    for err in [tile, region] {
        assert!(matches!(err, TileError::OpenFailure { .. }));
        assert!(err.is_image_fatal());
    }
    assert_eq!(service.registry().cached_count().await, 0);
}

#[tokio::test]
async fn test_resolver_and_compositor_over_registry() {
    let registry = ImageRegistry::new(patterned_source("slide.svs", FULL_LADDER));
    let cache = Arc::new(TileCache::with_capacity_mb(4.0));
    let resolver = TileResolver::new(Arc::clone(&cache));

    let image = registry.get_image("slide.svs").await.unwrap();

    let tile = resolver.get_tile(&image, 2, 0).await.unwrap();
    assert_eq!(tile.origin, TileOrigin::Native);

    let region = RegionCompositor::new(&resolver)
        .region(&image, 2, 0, 0, 16, 16)
        .await
        .unwrap();
    assert_eq!(region.pixel(15, 15), &pattern_pixel(0, 15, 15));

    // The region reused the cached tile
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_shared_service_across_tasks() {
    let source = patterned_source("slide.svs", SPARSE_LADDER);
    let service = Arc::new(TileService::new(source.clone()));

    let mut handles = Vec::new();
    for tile in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.get_tile("slide.svs", 1, tile).await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_ne!(response.origin, TileOrigin::Native);
    }

    // Every native tile of level 1 was read once the whole level is built
    assert_eq!(source.read_count(), 16);
    assert_eq!(source.open_count(), 1);
}
