//! Image registry integration tests.
//!
//! Tests verify:
//! - Open handles are reused while the file is unchanged
//! - A newer file triggers a reopen
//! - Concurrent lookups open an image once
//! - An abandoned open still completes and serves later lookups
//! - Decode sessions return to the pool, closed, when handles are dropped

use std::sync::Arc;
use std::time::Duration;

use wsi_pyramid::image::ImageRegistry;
use wsi_pyramid::TileError;

use super::test_utils::{epoch_plus, patterned_source, MockImage, MockSource, FULL_LADDER};

#[tokio::test]
async fn test_cached_handle_is_reused() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());

    let first = registry.get_image("slide.svs").await.unwrap();
    let second = registry.get_image("slide.svs").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.open_count(), 1);
    assert_eq!(registry.cached_count().await, 1);
    assert_eq!(first.timestamp(), epoch_plus(1_000));
}

#[tokio::test]
async fn test_newer_file_is_reopened() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());

    let first = registry.get_image("slide.svs").await.unwrap();

    // An older or equal mtime keeps the handle
    source.touch("slide.svs", epoch_plus(500));
    let same = registry.get_image("slide.svs").await.unwrap();
    assert!(Arc::ptr_eq(&first, &same));

    source.touch("slide.svs", epoch_plus(2_000));
    let reopened = registry.get_image("slide.svs").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &reopened));
    assert_eq!(reopened.timestamp(), epoch_plus(2_000));
    assert_eq!(source.open_count(), 2);
    assert_eq!(registry.cached_count().await, 1);

    let cached = registry.get_image("slide.svs").await.unwrap();
    assert!(Arc::ptr_eq(&reopened, &cached));
}

#[tokio::test]
async fn test_reopen_sees_new_geometry() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());

    let first = registry.get_image("slide.svs").await.unwrap();
    assert_eq!(first.descriptor().num_resolutions(), 3);

    let mut replacement = MockImage::new(&[(200, 200)]);
    replacement.modified = epoch_plus(3_000);
    source.set_image("slide.svs", replacement);

    let reopened = registry.get_image("slide.svs").await.unwrap();
    assert_eq!(reopened.descriptor().num_resolutions(), 1);
}

#[tokio::test]
async fn test_concurrent_lookups_open_once() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = Arc::new(ImageRegistry::new(source.clone()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.get_image("slide.svs").await
        }));
    }

    let mut images = Vec::new();
    for handle in handles {
        images.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(source.open_count(), 1);
    assert!(images.iter().all(|image| Arc::ptr_eq(image, &images[0])));
}

#[tokio::test]
async fn test_abandoned_open_still_completes() {
    let source = MockSource::new().with_image(
        "slow.svs",
        MockImage::new(FULL_LADDER).with_open_delay(Duration::from_millis(200)),
    );
    let registry = ImageRegistry::new(source.clone());

    // The caller gives up while the open is still running
    let abandoned = tokio::time::timeout(Duration::from_millis(20), registry.get_image("slow.svs")).await;
    assert!(abandoned.is_err());

    let image = tokio::time::timeout(Duration::from_secs(2), registry.get_image("slow.svs"))
        .await
        .expect("lookup after an abandoned open must not hang")
        .unwrap();

    assert_eq!(image.path(), "slow.svs");
    assert_eq!(source.open_count(), 1);
    assert_eq!(registry.cached_count().await, 1);
}

#[tokio::test]
async fn test_missing_image_is_not_cached() {
    let source = MockSource::new();
    let registry = ImageRegistry::new(source.clone());

    let err = registry.get_image("late.svs").await.unwrap_err();
    assert!(matches!(err, TileError::OpenFailure { .. }));
    assert_eq!(registry.cached_count().await, 0);

    source.set_image("late.svs", MockImage::new(FULL_LADDER));
    assert!(registry.get_image("late.svs").await.is_ok());
}

#[tokio::test]
async fn test_reopen_with_invalid_geometry_fails() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());
    registry.get_image("slide.svs").await.unwrap();

    // The rewritten file has no levels
    source.set_image("slide.svs", MockImage::new(&[]));
    source.touch("slide.svs", epoch_plus(9_000));

    assert!(matches!(
        registry.get_image("slide.svs").await,
        Err(TileError::GeometryFailure { .. })
    ));
}

#[tokio::test]
async fn test_capacity_bounds_open_handles() {
    let source = MockSource::new()
        .with_image("a.svs", MockImage::new(FULL_LADDER))
        .with_image("b.svs", MockImage::new(FULL_LADDER));
    let registry = ImageRegistry::with_capacity(source.clone(), 1);

    registry.get_image("a.svs").await.unwrap();
    registry.get_image("b.svs").await.unwrap();
    assert_eq!(registry.cached_count().await, 1);

    // a.svs was evicted and must be opened again
    registry.get_image("a.svs").await.unwrap();
    assert_eq!(source.open_count(), 3);
}

#[tokio::test]
async fn test_invalidate_forces_reopen() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());

    registry.get_image("slide.svs").await.unwrap();
    registry.invalidate("slide.svs").await;
    assert_eq!(registry.cached_count().await, 0);

    registry.get_image("slide.svs").await.unwrap();
    assert_eq!(source.open_count(), 2);
}

#[tokio::test]
async fn test_sessions_return_to_pool() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let registry = ImageRegistry::new(source.clone());

    let image = registry.get_image("slide.svs").await.unwrap();
    assert_eq!(registry.pool().created_count(), 1);
    assert_eq!(registry.pool().idle_count(), 0);

    registry.clear().await;
    assert_eq!(registry.pool().idle_count(), 0);

    drop(image);
    assert_eq!(registry.pool().idle_count(), 1);

    // The next open reuses the idle session
    registry.get_image("slide.svs").await.unwrap();
    assert_eq!(registry.pool().created_count(), 1);
    assert_eq!(source.sessions_created(), 1);
    assert_eq!(registry.pool().idle_count(), 0);
}

#[tokio::test]
async fn test_idle_sessions_hold_no_file() {
    let source = MockSource::new()
        .with_image("a.svs", MockImage::new(FULL_LADDER))
        .with_image("b.svs", MockImage::new(FULL_LADDER))
        .with_image("c.svs", MockImage::new(FULL_LADDER))
        .with_image("d.svs", MockImage::new(FULL_LADDER));
    let registry = ImageRegistry::with_capacity(source.clone(), 1);

    for path in ["a.svs", "b.svs", "c.svs", "d.svs"] {
        registry.get_image(path).await.unwrap();
    }
    // Only the newest handle is still open
    assert_eq!(source.open_files(), 1);

    registry.clear().await;
    assert_eq!(registry.cached_count().await, 0);
    assert!(registry.pool().idle_count() > 0);
    assert_eq!(source.open_files(), 0);
}
