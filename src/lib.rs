//! # WSI Pyramid
//!
//! The tile-serving core for pyramidal whole-slide images.
//!
//! Native decoders expose a handful of resolution levels, usually spaced by
//! factors of 4 or more. This library presents every image as a virtual
//! pyramid of power-of-two levels, serves fixed-size RGB8 tiles out of a
//! memory-bounded LRU cache, and synthesizes the levels the decoder lacks by
//! halfsampling and composing tiles of the next finer level.
//!
//! ## Features
//!
//! - **Virtual pyramid**: power-of-two levels mapped onto whatever native levels exist
//! - **Byte-budgeted caching**: one LRU cache for tiles, one for open images
//! - **On-demand composition**: missing levels are built recursively from finer tiles
//! - **Pixel normalization**: any supported sample layout is reduced to interleaved RGB8
//! - **Staleness**: cached tiles and handles are dropped when the file on disk changes
//!
//! ## Architecture
//!
//! - [`backend`] - Decoder capability traits, session pool and a raster adapter
//! - [`cache`] - Generic LRU object cache
//! - [`pyramid`] - Virtual pyramid geometry
//! - [`pixel`] - Normalization, halfsampling and composition kernels
//! - [`image`] - Open image handles and the image registry
//! - [`tile`] - Tile resolver, region compositor and the tile service
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_pyramid::{RasterSource, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wsi_pyramid::TileError> {
//!     let service = TileService::with_capacity_mb(RasterSource::default(), 64.0, 100);
//!
//!     let region = service.get_region("slides/sample.png", 2, 0, 0, 300, 200).await?;
//!     println!("{}x{} RGB8", region.width, region.height);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod image;
pub mod pixel;
pub mod pyramid;
pub mod tile;

// Re-export commonly used types
pub use backend::{
    ByteOrder, DecodeSession, ImageSource, PixelFormat, PooledSession, RasterSession,
    RasterSource, SampleFormat, SessionPool, DECODE_BUFFER_LEN,
};
pub use cache::{CacheEntry, CacheStats, InsertOutcome, ObjectCache};
pub use config::{Cli, Command, Config};
pub use error::{BackendError, GeometryError, NormalizeError, TileError};
pub use crate::image::{ImageRegistry, OpenImage, DEFAULT_IMAGE_CACHE_CAPACITY};
pub use pixel::{compose, halfsample, normalize_to_rgb8};
pub use pyramid::{choose_tile_size, PyramidDescriptor, VirtualLevel};
pub use tile::{
    PixelBuffer, RegionCompositor, TileCache, TileKey, TileOrigin, TileRecord, TileResolver,
    TileResponse, TileService, DEFAULT_TILE_CACHE_MB,
};
