//! Virtual power-of-two resolution pyramid.
//!
//! Slide formats store an arbitrary ladder of native resolutions (often 1×,
//! 4×, 16×, 32× downsampled). Tile clients expect every power of two between
//! full resolution and "fits in one tile". The descriptor bridges the two:
//!
//! ```text
//!  virtual level   size          native level   in-level downsample
//!  ─────────────   ───────────   ────────────   ───────────────────
//!        0         2000 x 1600        0               1   (read)
//!        1         1000 x  800        1               1   (read)
//!        2          500 x  400        1               2   (composed)
//!        3          250 x  200        1               4   (composed)
//! ```
//!
//! Virtual level 0 is the finest. Requests number resolutions the other way
//! round: resolution 0 is the coarsest virtual level and resolution `n - 1`
//! is full resolution. [`PyramidDescriptor::level_index`] performs the
//! inversion and is the only place it happens.

use serde::Serialize;

use crate::error::{GeometryError, TileError};

/// Smallest tile edge chosen from a decoder hint.
pub const MIN_TILE_SIZE: u32 = 128;

/// Largest tile edge chosen from a decoder hint.
pub const MAX_TILE_SIZE: u32 = 512;

/// Tile edge used when the decoder hint is missing or too small.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Tile Size Selection
// =============================================================================

/// Pick a square power-of-two tile edge for an image.
///
/// The decoder's optimal width is rounded down to a power of two, replaced by
/// [`DEFAULT_TILE_SIZE`] below [`MIN_TILE_SIZE`] and clamped to
/// [`MAX_TILE_SIZE`]. The edge is then halved until one raw tile fits the
/// decoder's transfer buffer.
pub fn choose_tile_size(
    optimal_width: Option<u32>,
    bytes_per_sample: u32,
    channels: u32,
    buffer_len: usize,
) -> u32 {
    let mut tile = match optimal_width {
        Some(width) if width > 0 => 1 << (31 - width.leading_zeros()),
        _ => 0,
    };

    if tile < MIN_TILE_SIZE {
        tile = DEFAULT_TILE_SIZE;
    } else if tile > MAX_TILE_SIZE {
        tile = MAX_TILE_SIZE;
    }

    let bytes_per_pixel = bytes_per_sample as usize * channels as usize;
    while tile > 1 && (tile as usize).pow(2) * bytes_per_pixel > buffer_len {
        tile >>= 1;
    }

    tile
}

// =============================================================================
// VirtualLevel
// =============================================================================

/// One level of the virtual pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VirtualLevel {
    /// Native level the pixels come from
    pub native_level: usize,

    /// Power-of-two reduction applied on top of the native level
    pub downsample: u32,

    /// Level width in pixels
    pub width: u32,

    /// Level height in pixels
    pub height: u32,

    /// Number of tile columns
    pub tiles_x: u32,

    /// Number of tile rows
    pub tiles_y: u32,

    /// Width of the last column when it is partial, 0 otherwise
    pub last_col_remainder: u32,

    /// Height of the last row when it is partial, 0 otherwise
    pub last_row_remainder: u32,
}

impl VirtualLevel {
    fn new(native_level: usize, downsample: u32, width: u32, height: u32, tile: u32) -> Self {
        Self {
            native_level,
            downsample,
            width,
            height,
            tiles_x: width.div_ceil(tile),
            tiles_y: height.div_ceil(tile),
            last_col_remainder: width % tile,
            last_row_remainder: height % tile,
        }
    }

    /// Whether tiles at this level are read directly from the decoder.
    pub fn is_native(&self) -> bool {
        self.downsample == 1
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Pixel size of tile `(tile_x, tile_y)`; edge tiles may be smaller.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> (u32, u32) {
        let width = if tile_x + 1 == self.tiles_x && self.last_col_remainder != 0 {
            self.last_col_remainder
        } else {
            tile_size
        };
        let height = if tile_y + 1 == self.tiles_y && self.last_row_remainder != 0 {
            self.last_row_remainder
        } else {
            tile_size
        };
        (width, height)
    }
}

// =============================================================================
// PyramidDescriptor
// =============================================================================

/// Mapping from virtual levels to native levels for one open image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidDescriptor {
    tile_size: u32,
    native_dimensions: Vec<(u32, u32)>,
    levels: Vec<VirtualLevel>,
}

impl PyramidDescriptor {
    /// Build the virtual pyramid from a native ladder, finest level first.
    ///
    /// Starting at full resolution, the running size is halved until it fits
    /// one tile. After each halving the next native level is used as soon as
    /// it is at least as large as the running size, skipping any further
    /// levels that are equally suitable; otherwise the current native level
    /// is reduced by a further factor of two.
    pub fn build(native: &[(u32, u32)], tile_size: u32) -> Result<Self, GeometryError> {
        if tile_size == 0 {
            return Err(GeometryError::ZeroTileSize);
        }
        if native.is_empty() {
            return Err(GeometryError::NoLevels);
        }
        for (level, &(width, height)) in native.iter().enumerate() {
            if width == 0 || height == 0 {
                return Err(GeometryError::EmptyLevel {
                    level,
                    width,
                    height,
                });
            }
        }

        // A (0, 0) sentinel never satisfies the fit test below, so advancing
        // stops at the last real level.
        let next_fits = |level: usize, width: u32, height: u32| -> bool {
            let (next_width, next_height) = native.get(level + 1).copied().unwrap_or((0, 0));
            width <= next_width && height <= next_height
        };

        let (mut width, mut height) = native[0];
        let mut native_level = 0;
        let mut downsample = 1;

        let mut levels = vec![VirtualLevel::new(
            native_level,
            downsample,
            width,
            height,
            tile_size,
        )];

        while width > tile_size || height > tile_size {
            width >>= 1;
            height >>= 1;

            if next_fits(native_level, width, height) {
                native_level += 1;
                downsample = 1;
                while next_fits(native_level, width, height) {
                    native_level += 1;
                }
            } else {
                downsample <<= 1;
            }

            levels.push(VirtualLevel::new(
                native_level,
                downsample,
                width,
                height,
                tile_size,
            ));
        }

        Ok(Self {
            tile_size,
            native_dimensions: native.to_vec(),
            levels,
        })
    }

    /// Tile edge in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of virtual levels, which is also the number of resolutions.
    pub fn num_resolutions(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Full-resolution image size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// The native ladder the descriptor was built from.
    pub fn native_dimensions(&self) -> &[(u32, u32)] {
        &self.native_dimensions
    }

    /// Virtual levels, finest first.
    pub fn levels(&self) -> &[VirtualLevel] {
        &self.levels
    }

    /// Virtual level index for a request-facing resolution.
    pub fn level_index(&self, resolution: u32) -> Result<usize, TileError> {
        let count = self.num_resolutions();
        if resolution >= count {
            return Err(TileError::ResolutionOutOfRange { resolution, count });
        }
        Ok((count - 1 - resolution) as usize)
    }

    /// Request-facing resolution for a virtual level index.
    pub fn resolution_of(&self, level_index: usize) -> u32 {
        self.num_resolutions() - 1 - level_index as u32
    }

    /// Virtual level for a request-facing resolution.
    pub fn level(&self, resolution: u32) -> Result<&VirtualLevel, TileError> {
        let index = self.level_index(resolution)?;
        Ok(&self.levels[index])
    }

    /// Split a flat, row-major tile index into `(tile_x, tile_y)`.
    pub fn tile_position(&self, resolution: u32, tile: u32) -> Result<(u32, u32), TileError> {
        let level = self.level(resolution)?;
        let count = level.tile_count();
        if tile >= count {
            return Err(TileError::TileOutOfRange {
                resolution,
                tile,
                count,
            });
        }
        Ok((tile % level.tiles_x, tile / level.tiles_x))
    }
}

// =============================================================================
// Tests
// =============================================================================
