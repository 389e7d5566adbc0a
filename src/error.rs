use thiserror::Error;

/// Errors reported by a decoder backend adapter.
///
/// Adapters only carry a message; the tile layer decides which
/// [`TileError`] category the failure belongs to based on where it happened.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend could not open or validate the source file
    #[error("cannot open source: {0}")]
    Open(String),

    /// A geometry or format query failed
    #[error("query failed: {0}")]
    Query(String),

    /// A region read failed
    #[error("read failed: {0}")]
    Read(String),

    /// The requested resolution level does not exist in the backend
    #[error("no native level {level} (backend has {count})")]
    NoSuchLevel { level: usize, count: usize },

    /// No source file is currently open in the session
    #[error("no source is open in this session")]
    NotOpen,
}

/// Invalid native geometry found while building a pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("backend reports no resolution levels")]
    NoLevels,

    #[error("native level {level} has zero extent ({width}x{height})")]
    EmptyLevel { level: usize, width: u32, height: u32 },

    #[error("tile size must be non-zero")]
    ZeroTileSize,
}

/// Errors from converting one buffer of decoder output to RGB8.
///
/// A format problem applies to every tile of the image; a length mismatch
/// only to the buffer at hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unsupported pixel format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("expected {expected} raw bytes, got {received}")]
    LengthMismatch { expected: usize, received: usize },
}

impl NormalizeError {
    /// Classify the failure for the tile it happened on.
    pub fn into_tile_error(self, resolution: u32, tile: u32) -> TileError {
        match self {
            NormalizeError::UnsupportedFormat { reason } => TileError::UnsupportedFormat { reason },
            err @ NormalizeError::LengthMismatch { .. } => TileError::DecodeFailure {
                resolution,
                tile,
                message: err.to_string(),
            },
        }
    }
}

/// Errors surfaced to callers of the tile and region operations.
///
/// The variants separate failures that make the whole image unservable
/// ([`TileError::is_image_fatal`]) from failures scoped to one request.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The backend cannot open or validate the source file
    #[error("failed to open '{path}': {source}")]
    OpenFailure {
        path: String,
        #[source]
        source: BackendError,
    },

    /// The backend reported an invalid level count or level dimensions
    #[error("invalid geometry for '{path}': {message}")]
    GeometryFailure { path: String, message: String },

    /// Channel count, colour model or dimension ordering is not handled
    #[error("unsupported pixel format: {reason}")]
    UnsupportedFormat { reason: String },

    /// A specific tile read returned an error or an unexpected byte count
    #[error("failed to decode tile {tile} at resolution {resolution}: {message}")]
    DecodeFailure {
        resolution: u32,
        tile: u32,
        message: String,
    },

    /// Requested resolution exceeds the pyramid
    #[error("resolution {resolution} out of range (pyramid has {count} resolutions)")]
    ResolutionOutOfRange { resolution: u32, count: u32 },

    /// Requested flat tile index exceeds the level's grid
    #[error("tile {tile} out of range at resolution {resolution} (level has {count} tiles)")]
    TileOutOfRange {
        resolution: u32,
        tile: u32,
        count: u32,
    },

    /// Requested pixel rectangle is empty or exceeds the level bounds
    #[error(
        "region {width}x{height}+{x}+{y} out of range at resolution {resolution} \
         (level is {level_width}x{level_height})"
    )]
    RegionOutOfRange {
        resolution: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },
}

impl TileError {
    /// Whether this error means the image cannot be served at all, as opposed
    /// to a single tile or region request failing.
    pub fn is_image_fatal(&self) -> bool {
        matches!(
            self,
            TileError::OpenFailure { .. }
                | TileError::GeometryFailure { .. }
                | TileError::UnsupportedFormat { .. }
        )
    }
}
