//! Tile resolution layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileService                │
//! └──────────┬─────────────────┬────────────┘
//!            │                 │
//!            ▼                 ▼
//! ┌──────────────────┐ ┌──────────────────┐
//! │ RegionCompositor │ │  ImageRegistry   │
//! └────────┬─────────┘ └──────────────────┘
//!          ▼
//! ┌─────────────────────────────────────────┐
//! │ TileResolver: cache → native | compose  │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TileCache = ObjectCache<TileRecord> │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: path-based entry point owning the registry and cache
//! - [`TileResolver`]: cache-first, fetch-or-compose tile resolution
//! - [`RegionCompositor`]: arbitrary rectangles stitched from tiles
//! - [`TileRecord`] / [`TileKey`]: cached value and its identity
//! - [`PixelBuffer`]: RGB8 output of region requests

mod record;
mod region;
mod resolver;
mod service;

pub use record::{CompressionKind, SampleType, TileKey, TileRecord, TILE_ENTRY_OVERHEAD};
pub use region::{PixelBuffer, RegionCompositor};
pub use resolver::{TileCache, TileOrigin, TileResolver, TileResponse, DEFAULT_TILE_CACHE_MB};
pub use service::TileService;
