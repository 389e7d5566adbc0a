//! Configuration management for the `wsi-pyramid` binary.
//!
//! This module provides:
//! - Command-line arguments and subcommands via clap
//! - Environment variables with `WSI_` prefix for the engine options
//! - Defaults taken from the library's `DEFAULT_*` constants
//!
//! # Environment Variables
//!
//! - `WSI_TILE_CACHE_MB` - Tile cache budget in megabytes (default: 10, 0 disables)
//! - `WSI_IMAGE_CACHE` - Number of open images to keep (default: 500)
//! - `WSI_LEVEL_RATIO` - Size ratio between native levels (default: 4)
//! - `WSI_MAX_NATIVE_LEVELS` - Maximum number of native levels (default: 4)
//! - `WSI_TILE_HINT` - Optimal tile width reported by the decoder (default: 256)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::backend::{RasterSource, DEFAULT_LEVEL_RATIO, DEFAULT_MAX_NATIVE_LEVELS};
use crate::image::DEFAULT_IMAGE_CACHE_CAPACITY;
use crate::pyramid::DEFAULT_TILE_SIZE;
use crate::tile::{TileService, DEFAULT_TILE_CACHE_MB};

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Pyramid - tile and region extraction for pyramidal images.
///
/// Builds a power-of-two virtual pyramid over an image, serves tiles from a
/// memory-bounded cache and composes missing levels on demand.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: Config,
}

impl Cli {
    /// Split into the subcommand and the shared engine configuration.
    pub fn into_parts(self) -> (Command, Config) {
        (self.command, self.config)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the virtual pyramid of an image as JSON.
    Info {
        /// Image file
        path: PathBuf,
    },

    /// Resolve one tile and save it as PNG.
    Tile(TileArgs),

    /// Extract a pixel rectangle and save it as PNG.
    Region(RegionArgs),

    /// Resolve every tile of a resolution concurrently and report cache usage.
    Warm(WarmArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TileArgs {
    /// Image file
    pub path: PathBuf,

    /// Resolution, 0 being the coarsest
    #[arg(short, long)]
    pub resolution: u32,

    /// Row-major tile index within the resolution
    #[arg(short, long)]
    pub tile: u32,

    /// Output PNG file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Image file
    pub path: PathBuf,

    /// Resolution, 0 being the coarsest
    #[arg(short, long)]
    pub resolution: u32,

    /// Left edge in resolution pixels
    #[arg(long, default_value_t = 0)]
    pub x: u32,

    /// Top edge in resolution pixels
    #[arg(long, default_value_t = 0)]
    pub y: u32,

    #[arg(long)]
    pub width: u32,

    #[arg(long)]
    pub height: u32,

    /// Output PNG file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct WarmArgs {
    /// Image file
    pub path: PathBuf,

    /// Resolution to warm (defaults to the finest)
    #[arg(short, long)]
    pub resolution: Option<u32>,
}

/// Engine options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Tile cache budget in megabytes (0 disables tile caching).
    #[arg(long, global = true, default_value_t = DEFAULT_TILE_CACHE_MB, env = "WSI_TILE_CACHE_MB")]
    pub tile_cache_mb: f64,

    /// Maximum number of open images to keep.
    #[arg(long, global = true, default_value_t = DEFAULT_IMAGE_CACHE_CAPACITY, env = "WSI_IMAGE_CACHE")]
    pub image_cache: usize,

    // =========================================================================
    // Decoder Configuration
    // =========================================================================
    /// Size ratio between consecutive native levels of the raster decoder.
    #[arg(long, global = true, default_value_t = DEFAULT_LEVEL_RATIO, env = "WSI_LEVEL_RATIO")]
    pub level_ratio: u32,

    /// Maximum number of native levels the raster decoder exposes.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_NATIVE_LEVELS, env = "WSI_MAX_NATIVE_LEVELS")]
    pub max_native_levels: usize,

    /// Optimal tile width reported by the decoder.
    #[arg(long, global = true, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_HINT")]
    pub tile_hint: u32,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.tile_cache_mb.is_finite() || self.tile_cache_mb < 0.0 {
            return Err("tile_cache_mb must be a non-negative number".to_string());
        }

        if self.image_cache == 0 {
            return Err("image_cache must be greater than 0".to_string());
        }

        if self.level_ratio < 2 {
            return Err("level_ratio must be at least 2".to_string());
        }

        if self.max_native_levels == 0 {
            return Err("max_native_levels must be greater than 0".to_string());
        }

        if self.tile_hint == 0 {
            return Err("tile_hint must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The raster decoder described by this configuration.
    pub fn raster_source(&self) -> RasterSource {
        RasterSource::new(self.level_ratio, self.max_native_levels).with_tile_hint(self.tile_hint)
    }

    /// A tile service over the raster decoder with the configured budgets.
    pub fn tile_service(&self) -> TileService<RasterSource> {
        TileService::with_capacity_mb(self.raster_source(), self.tile_cache_mb, self.image_cache)
    }
}

// =============================================================================
// Tests
// =============================================================================
