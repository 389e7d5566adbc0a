//! Decoder backend capability interface.
//!
//! The tile engine never parses image files itself. It talks to a decoder
//! through two traits:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         OpenImage / TileResolver        │
//! └────────────────────┬────────────────────┘
//!                      │  geometry, pixel format, raw region bytes
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   DecodeSession (one per open image,    │
//! │   recycled through SessionPool)         │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  RasterSource   │    │  other adapters     │
//! │  (PNG / JPEG)   │    │  (vendor SDKs, ...) │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! An [`ImageSource`] creates sessions and reports file modification times.
//! A [`DecodeSession`] is a move-only handle bound to at most one open file at
//! a time; it answers geometry queries and reads raw, un-normalized regions
//! from a native resolution level.

mod pool;
mod raster;

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::BackendError;

pub use pool::{PooledSession, SessionPool};
pub use raster::{RasterSession, RasterSource, DEFAULT_LEVEL_RATIO, DEFAULT_MAX_NATIVE_LEVELS};

/// Size of the buffer a decoder fills on each region read.
///
/// 2048 × 2048 pixels × 4 channels × 16 bits. Tile sizes are chosen so that a
/// single tile read never exceeds it.
pub const DECODE_BUFFER_LEN: usize = 33_554_432;

// =============================================================================
// Pixel Format
// =============================================================================

/// Numeric interpretation of each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Unsigned integer of `bytes_per_sample` bytes
    Unsigned,
    /// Two's complement signed integer of `bytes_per_sample` bytes
    Signed,
    /// IEEE-754 single precision, nominal range 0.0..=1.0
    Float,
    /// IEEE-754 double precision, nominal range 0.0..=1.0
    Double,
    /// One-bit samples stored one per byte (0 or 1)
    Bit,
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

/// Layout of the raw bytes a decoder returns for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PixelFormat {
    /// Samples per pixel returned by each read (3 or 4 are servable)
    pub channels: u32,

    /// Storage width of one sample
    pub bytes_per_sample: u32,

    /// How samples are interpreted
    pub sample: SampleFormat,

    /// `true` for RGBRGB..., `false` for planar RRR...GGG...BBB...
    pub interleaved: bool,

    /// Order of bytes within a multi-byte sample
    pub byte_order: ByteOrder,

    /// Samples are indices into a colour table
    pub indexed: bool,

    /// Indexed samples may be rendered directly without the table
    pub false_color: bool,

    /// Dimension ordering reported by the decoder, e.g. `"XYCZT"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_order: Option<String>,
}

impl PixelFormat {
    /// Interleaved, unsigned, 8-bit RGB.
    pub fn rgb8() -> Self {
        Self {
            channels: 3,
            bytes_per_sample: 1,
            sample: SampleFormat::Unsigned,
            interleaved: true,
            byte_order: ByteOrder::native(),
            indexed: false,
            false_color: false,
            dimension_order: None,
        }
    }

    /// Bytes occupied by one pixel in the decoder's layout.
    pub fn bytes_per_pixel(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Bytes a decoder must return for a `width × height` region.
    pub fn region_len(&self, width: u32, height: u32) -> usize {
        self.bytes_per_pixel() * width as usize * height as usize
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// A decoding session bound to one execution context.
///
/// Sessions are not `Clone`: each is owned by exactly one holder at a time and
/// moves between the [`SessionPool`] and an open image. Geometry and format
/// queries refer to the level most recently selected with
/// [`set_current_level`](DecodeSession::set_current_level).
#[async_trait]
pub trait DecodeSession: Send + 'static {
    /// Open a source file, replacing anything previously opened.
    async fn open(&mut self, path: &str) -> Result<(), BackendError>;

    /// Release the currently open file, if any.
    ///
    /// Called from the pool's drop path, so it must not block on I/O.
    fn close(&mut self);

    /// Number of native resolution levels, finest first.
    fn resolution_count(&self) -> Result<usize, BackendError>;

    /// Select the native level subsequent queries and reads refer to.
    fn set_current_level(&mut self, level: usize) -> Result<(), BackendError>;

    /// `(width, height)` of the current level.
    fn dimensions(&self) -> Result<(u32, u32), BackendError>;

    /// Preferred tile width of the underlying format, if it has one.
    fn optimal_tile_width(&self) -> Option<u32>;

    /// Raw sample layout of the current level.
    fn pixel_format(&self) -> Result<PixelFormat, BackendError>;

    /// Read a rectangle of raw samples from a native level.
    ///
    /// Coordinates are pixels within that level. The returned buffer holds
    /// exactly the bytes the decoder produced; callers validate its length.
    async fn read_region(
        &mut self,
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Bytes, BackendError>;

    /// Capacity of the decoder's transfer buffer.
    fn buffer_len(&self) -> usize {
        DECODE_BUFFER_LEN
    }
}

/// Factory for decode sessions plus filesystem metadata.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    /// The session type this source produces.
    type Session: DecodeSession;

    /// Create a fresh session with nothing open.
    async fn create_session(&self) -> Result<Self::Session, BackendError>;

    /// Modification time of the source file at `path`.
    async fn modified(&self, path: &str) -> Result<SystemTime, BackendError>;
}
