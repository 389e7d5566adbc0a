//! Region extraction integration tests.
//!
//! Tests verify:
//! - Regions crossing tile boundaries are stitched pixel-exactly
//! - Full-level regions match the level's tiles
//! - Empty or out-of-bounds rectangles are rejected without decoding

use wsi_pyramid::tile::TileService;
use wsi_pyramid::TileError;

use super::test_utils::{
    patterned_source, pattern_pixel, Fill, MockImage, MockSource, FULL_LADDER, SPARSE_LADDER,
};

#[tokio::test]
async fn test_region_across_tile_boundaries() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    let region = service.get_region("slide.svs", 2, 200, 240, 100, 50).await.unwrap();

    assert_eq!((region.width, region.height, region.channels), (100, 50, 3));
    assert_eq!(region.data.len(), 100 * 50 * 3);

    // Four tiles intersect the rectangle
    assert_eq!(source.read_count(), 4);

    for (x, y) in [(0, 0), (55, 15), (56, 16), (99, 49), (57, 3)] {
        assert_eq!(
            region.pixel(x, y),
            &pattern_pixel(0, 200 + x, 240 + y),
            "pixel ({x}, {y})"
        );
    }
}

#[tokio::test]
async fn test_region_within_one_tile() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    let region = service.get_region("slide.svs", 1, 10, 20, 30, 40).await.unwrap();
    assert_eq!(source.read_count(), 1);
    assert_eq!(region.pixel(29, 39), &pattern_pixel(1, 39, 59));
}

#[tokio::test]
async fn test_full_level_region_matches_tile() {
    let service = TileService::new(patterned_source("slide.svs", FULL_LADDER));

    let region = service.get_region("slide.svs", 0, 0, 0, 250, 200).await.unwrap();
    let tile = service.get_tile("slide.svs", 0, 0).await.unwrap().record;

    assert_eq!((region.width, region.height), (tile.width(), tile.height()));
    assert_eq!(&region.data[..], &tile.data()[..]);
}

#[tokio::test]
async fn test_full_level_region_of_finest_resolution() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    let region = service.get_region("slide.svs", 2, 0, 0, 1000, 800).await.unwrap();
    assert_eq!(source.read_count(), 16);
    assert_eq!(region.pixel(999, 799), &pattern_pixel(0, 999, 799));
    assert_eq!(region.pixel(512, 300), &pattern_pixel(0, 512, 300));
}

#[tokio::test]
async fn test_region_of_composed_level() {
    const COLOURS: &[[u8; 3]] = &[[10, 20, 30], [200, 100, 50]];
    let source = MockSource::new().with_image(
        "solid.svs",
        MockImage::new(SPARSE_LADDER).with_fill(Fill::Solid(COLOURS)),
    );
    let service = TileService::new(source);

    let region = service.get_region("solid.svs", 1, 100, 100, 300, 200).await.unwrap();
    assert!(region.data.chunks_exact(3).all(|pixel| pixel == [200, 100, 50]));
}

#[tokio::test]
async fn test_invalid_regions_are_rejected() {
    let source = patterned_source("slide.svs", FULL_LADDER);
    let service = TileService::new(source.clone());

    for (x, y, width, height) in [(0, 0, 0, 10), (0, 0, 10, 0), (900, 0, 101, 10), (0, 790, 10, 11)] {
        let err = service
            .get_region("slide.svs", 2, x, y, width, height)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                TileError::RegionOutOfRange {
                    level_width: 1000,
                    level_height: 800,
                    ..
                }
            ),
            "{x},{y} {width}x{height}: {err}"
        );
        assert!(!err.is_image_fatal());
    }

    assert!(matches!(
        service.get_region("slide.svs", 9, 0, 0, 1, 1).await,
        Err(TileError::ResolutionOutOfRange { .. })
    ));
    assert_eq!(source.read_count(), 0);
}
