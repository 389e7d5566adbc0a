//! Tile service: the entry point for tile and region requests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  get_tile(path, resolution, tile)                               │
//! │  get_region(path, resolution, x, y, width, height)              │
//! │           │                                  │                  │
//! │           ▼                                  ▼                  │
//! │    ┌───────────────┐               ┌──────────────────────┐     │
//! │    │ ImageRegistry │               │ TileResolver         │     │
//! │    │ (open images) │               │ + RegionCompositor   │     │
//! │    └───────────────┘               └──────────┬───────────┘     │
//! │                                               ▼                 │
//! │                                        ┌─────────────┐          │
//! │                                        │  TileCache  │          │
//! │                                        └─────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::warn;

use crate::backend::ImageSource;
use crate::cache::CacheStats;
use crate::error::TileError;
use crate::image::{ImageRegistry, OpenImage, DEFAULT_IMAGE_CACHE_CAPACITY};
use crate::pyramid::PyramidDescriptor;

use super::region::{PixelBuffer, RegionCompositor};
use super::resolver::{TileCache, TileResolver, TileResponse, DEFAULT_TILE_CACHE_MB};

/// Service for resolving tiles and regions of any image a source can open.
///
/// One tile cache is shared by every image. Handles to open images live in
/// the registry's own, count-budgeted cache.
///
/// # Example
///
/// ```no_run
/// use wsi_pyramid::backend::RasterSource;
/// use wsi_pyramid::tile::TileService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), wsi_pyramid::TileError> {
///     let service = TileService::new(RasterSource::default());
///
///     let pyramid = service.pyramid("slides/sample.png").await?;
///     let coarsest = service.get_tile("slides/sample.png", 0, 0).await?;
///     println!(
///         "{} resolutions, coarsest tile {}x{} ({:?})",
///         pyramid.num_resolutions(),
///         coarsest.record.width(),
///         coarsest.record.height(),
///         coarsest.origin,
///     );
///     Ok(())
/// }
/// ```
pub struct TileService<S: ImageSource> {
    registry: ImageRegistry<S>,
    resolver: TileResolver,
}

impl<S: ImageSource> TileService<S> {
    /// Create a service with the default cache budgets.
    pub fn new(source: S) -> Self {
        let cache = TileCache::with_capacity_mb(DEFAULT_TILE_CACHE_MB);
        Self::with_caches(source, cache, DEFAULT_IMAGE_CACHE_CAPACITY)
    }

    /// Create a service with explicit budgets.
    ///
    /// # Arguments
    ///
    /// * `tile_cache_bytes` - Tile cache budget in bytes (0 disables it)
    /// * `image_capacity` - Number of open images to keep
    pub fn with_capacity(source: S, tile_cache_bytes: usize, image_capacity: usize) -> Self {
        Self::with_caches(source, TileCache::with_capacity(tile_cache_bytes), image_capacity)
    }

    /// Create a service whose tile cache budget is given in megabytes.
    pub fn with_capacity_mb(source: S, tile_cache_mb: f64, image_capacity: usize) -> Self {
        Self::with_caches(source, TileCache::with_capacity_mb(tile_cache_mb), image_capacity)
    }

    fn with_caches(source: S, cache: TileCache, image_capacity: usize) -> Self {
        Self {
            registry: ImageRegistry::with_capacity(source, image_capacity),
            resolver: TileResolver::new(Arc::new(cache)),
        }
    }

    pub fn registry(&self) -> &ImageRegistry<S> {
        &self.registry
    }

    pub fn resolver(&self) -> &TileResolver {
        &self.resolver
    }

    /// Open (or fetch the cached handle of) an image.
    pub async fn image(&self, path: &str) -> Result<Arc<OpenImage<S>>, TileError> {
        self.registry.get_image(path).await.inspect_err(|e| {
            warn!(path, error = %e, "failed to open image");
        })
    }

    /// Resolve one tile.
    ///
    /// `resolution` counts from 0 at the coarsest level; `tile` is the
    /// row-major index within that resolution.
    pub async fn get_tile(
        &self,
        path: &str,
        resolution: u32,
        tile: u32,
    ) -> Result<TileResponse, TileError> {
        let image = self.image(path).await?;
        self.resolver
            .get_tile(&image, resolution, tile)
            .await
            .inspect_err(|e| {
                warn!(path, resolution, tile, error = %e, "tile request failed");
            })
    }

    /// Extract a pixel rectangle at a resolution.
    pub async fn get_region(
        &self,
        path: &str,
        resolution: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, TileError> {
        let image = self.image(path).await?;
        RegionCompositor::new(&self.resolver)
            .region(&image, resolution, x, y, width, height)
            .await
            .inspect_err(|e| {
                warn!(path, resolution, x, y, width, height, error = %e, "region request failed");
            })
    }

    /// The virtual pyramid of an image.
    pub async fn pyramid(&self, path: &str) -> Result<PyramidDescriptor, TileError> {
        Ok(self.image(path).await?.descriptor().clone())
    }

    /// Tile cache occupancy.
    pub async fn cache_stats(&self) -> CacheStats {
        self.resolver.cache().stats().await
    }

    /// Drop every cached tile.
    pub async fn clear_cache(&self) {
        self.resolver.cache().clear().await;
    }
}
