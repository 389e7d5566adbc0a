//! Cache-first tile resolution with recursive composition.
//!
//! ```text
//!   get_tile(resolution, tile)
//!        │
//!        ▼
//!   cache lookup ── hit (fresh) ──────────────────────────────► return
//!        │ miss / stale
//!        ▼
//!   downsample == 1 ? ── yes ──► native read + normalize ──┐
//!        │ no                                              │
//!        ▼                                                 ▼
//!   resolve up to 4 children one level finer,        cache insert ──► return
//!   halfsample each, compose into quadrants ───────────────┘
//! ```
//!
//! Recursion always moves to a strictly finer virtual level and stops at a
//! native level or a cache hit. Every tile produced along the way, including
//! children produced only to feed a compose, is inserted into the cache.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::backend::ImageSource;
use crate::cache::ObjectCache;
use crate::error::TileError;
use crate::image::OpenImage;
use crate::pixel::{compose, halfsample, RGB_CHANNELS};

use super::record::{TileKey, TileRecord};

/// Cache of resolved tiles.
pub type TileCache = ObjectCache<TileRecord>;

/// Default tile cache budget in megabytes.
pub const DEFAULT_TILE_CACHE_MB: f64 = 10.0;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a tile was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileOrigin {
    /// Served from the tile cache
    Cache,
    /// Read from a native decoder level
    Native,
    /// Composed from four finer tiles
    Composed,
}

/// A resolved tile and where it came from.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub record: Arc<TileRecord>,
    pub origin: TileOrigin,
}

/// Resolves tiles against a shared [`TileCache`].
///
/// The resolver holds no per-image state, so one instance serves every open
/// image. The cache lock is only taken for lookups and inserts, never across
/// a decoder call or a compose.
pub struct TileResolver {
    cache: Arc<TileCache>,
}

impl TileResolver {
    pub fn new(cache: Arc<TileCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// Resolve a tile by request-facing resolution and flat tile index.
    ///
    /// Out-of-range requests are rejected before any cache or decoder access.
    pub async fn get_tile<S: ImageSource>(
        &self,
        image: &OpenImage<S>,
        resolution: u32,
        tile: u32,
    ) -> Result<TileResponse, TileError> {
        let descriptor = image.descriptor();
        let (tile_x, tile_y) = descriptor.tile_position(resolution, tile)?;
        let level_index = descriptor.level_index(resolution)?;

        self.resolve(image, level_index, tile_x, tile_y).await
    }

    /// Resolve `(tile_x, tile_y)` at a virtual level index.
    fn resolve<'a, S: ImageSource>(
        &'a self,
        image: &'a OpenImage<S>,
        level_index: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> BoxFuture<'a, Result<TileResponse, TileError>> {
        Box::pin(async move {
            let descriptor = image.descriptor();
            let level = descriptor.levels()[level_index];
            let resolution = descriptor.resolution_of(level_index);
            let tile = tile_y * level.tiles_x + tile_x;

            let key = TileKey::uncompressed(image.path_arc(), resolution, tile).to_string();

            if let Some(cached) = self.cache.get(&key).await {
                if cached.timestamp() >= image.timestamp() {
                    debug!(key = %key, "tile cache hit");
                    return Ok(TileResponse {
                        record: cached,
                        origin: TileOrigin::Cache,
                    });
                }
                debug!(key = %key, "evicting tile older than its image");
                self.cache.evict(&cached).await;
            }

            let (data, origin) = if level.is_native() {
                let data = image
                    .read_native_tile(&level, resolution, tile_x, tile_y)
                    .await?;
                debug!(key = %key, native_level = level.native_level, "native tile read");
                (data, TileOrigin::Native)
            } else {
                let data = self.compose_from_children(image, level_index, tile_x, tile_y).await?;
                debug!(key = %key, downsample = level.downsample, "composed tile");
                (data, TileOrigin::Composed)
            };

            let (width, height) = level.tile_dimensions(tile_x, tile_y, descriptor.tile_size());
            let record = Arc::new(TileRecord::rgb8(
                image.path_arc(),
                resolution,
                tile,
                width,
                height,
                data,
                image.timestamp(),
            ));

            self.cache.insert(Arc::clone(&record)).await;

            Ok(TileResponse { record, origin })
        })
    }

    /// Build a tile of a synthetic level from the 2×2 block of tiles one
    /// level finer.
    async fn compose_from_children<S: ImageSource>(
        &self,
        image: &OpenImage<S>,
        level_index: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TileError> {
        let descriptor = image.descriptor();
        let tile_size = descriptor.tile_size();
        let level = descriptor.levels()[level_index];
        let (width, height) = level.tile_dimensions(tile_x, tile_y, tile_size);

        // A synthetic level always has a finer neighbour: level 0 is native
        let child_index = level_index - 1;
        let child_level = descriptor.levels()[child_index];

        let mut out = vec![0u8; width as usize * height as usize * RGB_CHANNELS as usize];

        for j in 0..2 {
            let child_y = tile_y * 2 + j;
            if child_y >= child_level.tiles_y {
                break;
            }

            for i in 0..2 {
                let child_x = tile_x * 2 + i;
                if child_x >= child_level.tiles_x {
                    break;
                }

                let child = self.resolve(image, child_index, child_x, child_y).await?;
                let child = child.record;

                let half = halfsample(child.data(), child.width(), child.height());
                compose(
                    &mut out,
                    width,
                    height,
                    &half,
                    child.width() / 2,
                    child.height() / 2,
                    (tile_size / 2) * i,
                    (tile_size / 2) * j,
                );
            }
        }

        Ok(Bytes::from(out))
    }
}
