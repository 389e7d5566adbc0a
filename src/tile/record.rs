use std::fmt;
use std::mem::size_of;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;

use crate::cache::CacheEntry;

/// Per-entry bookkeeping charged on top of payload and key bytes.
pub const TILE_ENTRY_OVERHEAD: usize = size_of::<TileRecord>() + size_of::<usize>() + 64;

// =============================================================================
// Cache Key
// =============================================================================

/// Compression applied to a tile's payload.
///
/// The engine only produces [`Uncompressed`](CompressionKind::Uncompressed)
/// tiles; the other kinds exist so encoded variants produced by a request
/// layer can share the same cache without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionKind {
    Uncompressed,
    Jpeg,
    Deflate,
}

impl CompressionKind {
    /// Numeric code used in cache identity strings.
    pub fn code(self) -> u8 {
        match self {
            CompressionKind::Uncompressed => 0,
            CompressionKind::Jpeg => 1,
            CompressionKind::Deflate => 2,
        }
    }
}

/// Identity of a tile.
///
/// Renders as `path:resolution:tile:h_sequence:v_sequence:compression:quality`.
/// Sequence angles are carried for microscopy stacks and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Image path the tile belongs to
    pub path: Arc<str>,

    /// Request-facing resolution (0 = coarsest)
    pub resolution: u32,

    /// Row-major tile index within the resolution
    pub tile: u32,

    /// Horizontal sequence angle
    pub h_sequence: i32,

    /// Vertical sequence angle
    pub v_sequence: i32,

    pub compression: CompressionKind,

    /// Compression quality, 0 when uncompressed
    pub quality: u32,
}

impl TileKey {
    /// Key of an uncompressed tile with zero sequence angles.
    pub fn uncompressed(path: impl Into<Arc<str>>, resolution: u32, tile: u32) -> Self {
        Self {
            path: path.into(),
            resolution,
            tile,
            h_sequence: 0,
            v_sequence: 0,
            compression: CompressionKind::Uncompressed,
            quality: 0,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.path,
            self.resolution,
            self.tile,
            self.h_sequence,
            self.v_sequence,
            self.compression.code(),
            self.quality
        )
    }
}

// =============================================================================
// TileRecord
// =============================================================================

/// Numeric kind of the payload samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Fixed,
    Float,
}

/// A resolved tile: pixel payload plus identity.
///
/// Records are immutable. The cache holds them behind `Arc`, and callers
/// receive clones of that `Arc`.
#[derive(Debug, Clone)]
pub struct TileRecord {
    key: TileKey,
    width: u32,
    height: u32,
    channels: u32,
    bits_per_channel: u32,
    sample_type: SampleType,
    data: Bytes,
    timestamp: SystemTime,
}

impl TileRecord {
    /// An uncompressed interleaved RGB8 tile.
    pub fn rgb8(
        path: impl Into<Arc<str>>,
        resolution: u32,
        tile: u32,
        width: u32,
        height: u32,
        data: Bytes,
        timestamp: SystemTime,
    ) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            key: TileKey::uncompressed(path, resolution, tile),
            width,
            height,
            channels: 3,
            bits_per_channel: 8,
            sample_type: SampleType::Fixed,
            data,
            timestamp,
        }
    }

    /// A tile with an arbitrary key and payload description.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: TileKey,
        width: u32,
        height: u32,
        channels: u32,
        bits_per_channel: u32,
        sample_type: SampleType,
        data: Bytes,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            key,
            width,
            height,
            channels,
            bits_per_channel,
            sample_type,
            data,
            timestamp,
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.key.path
    }

    pub fn resolution(&self) -> u32 {
        self.key.resolution
    }

    pub fn tile(&self) -> u32 {
        self.key.tile
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn bits_per_channel(&self) -> u32 {
        self.bits_per_channel
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Pixel payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Source file modification time when the image was opened.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

impl CacheEntry for TileRecord {
    fn cache_key(&self) -> String {
        self.key.to_string()
    }

    fn size_contribution(&self, key: &str) -> usize {
        self.data.len() + key.len() + self.key.path.len() + TILE_ENTRY_OVERHEAD
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}
