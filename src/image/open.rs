use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{DecodeSession, ImageSource, PixelFormat, PooledSession, SessionPool};
use crate::cache::CacheEntry;
use crate::error::{BackendError, TileError};
use crate::pixel::{check_format, normalize_to_rgb8};
use crate::pyramid::{choose_tile_size, PyramidDescriptor, VirtualLevel};

/// An opened image: validated format, virtual pyramid and a decode session.
///
/// The session is owned for the image's whole lifetime and returns to the
/// pool when the last `Arc<OpenImage>` is dropped. Reads through it are
/// serialized by the image's own lock.
pub struct OpenImage<S: ImageSource> {
    path: Arc<str>,
    timestamp: SystemTime,
    format: PixelFormat,
    descriptor: PyramidDescriptor,
    session: Mutex<PooledSession<S>>,
}

impl<S: ImageSource> std::fmt::Debug for OpenImage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenImage")
            .field("path", &self.path)
            .field("timestamp", &self.timestamp)
            .field("format", &self.format)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<S: ImageSource> OpenImage<S> {
    /// Open `path` with a session from `pool` and build its pyramid.
    ///
    /// The file's modification time is captured first, so a write that races
    /// with the open yields an image that is already considered stale.
    pub async fn open(path: &str, pool: &Arc<SessionPool<S>>) -> Result<Self, TileError> {
        let open_failure = |source: BackendError| TileError::OpenFailure {
            path: path.to_string(),
            source,
        };
        let geometry_failure = |message: String| TileError::GeometryFailure {
            path: path.to_string(),
            message,
        };

        let timestamp = pool.source().modified(path).await.map_err(open_failure)?;

        let mut session = pool.acquire().await.map_err(open_failure)?;
        session.open(path).await.map_err(open_failure)?;

        let format = session.pixel_format().map_err(open_failure)?;
        check_format(&format)?;

        let count = session
            .resolution_count()
            .map_err(|e| geometry_failure(e.to_string()))?;

        let mut native = Vec::with_capacity(count);
        for level in 0..count {
            session
                .set_current_level(level)
                .map_err(|e| geometry_failure(e.to_string()))?;
            let dimensions = session
                .dimensions()
                .map_err(|e| geometry_failure(e.to_string()))?;
            native.push(dimensions);
        }

        let tile_size = choose_tile_size(
            session.optimal_tile_width(),
            format.bytes_per_sample,
            format.channels,
            session.buffer_len(),
        );

        let descriptor = PyramidDescriptor::build(&native, tile_size)
            .map_err(|e| geometry_failure(e.to_string()))?;

        debug!(
            path,
            native_levels = native.len(),
            resolutions = descriptor.num_resolutions(),
            tile_size,
            "opened image"
        );

        Ok(Self {
            path: Arc::from(path),
            timestamp,
            format,
            descriptor,
            session: Mutex::new(session),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Shared handle to the path, for building tile keys.
    pub fn path_arc(&self) -> Arc<str> {
        Arc::clone(&self.path)
    }

    /// Modification time of the source file when it was opened.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Raw pixel format reported at open time.
    pub fn pixel_format(&self) -> &PixelFormat {
        &self.format
    }

    pub fn descriptor(&self) -> &PyramidDescriptor {
        &self.descriptor
    }

    /// Read and normalize one tile of a native virtual level.
    ///
    /// The tile origin is `(tile_x, tile_y) × tile_size` in the native level's
    /// own pixel space. Returns interleaved RGB8 of the tile's exact size.
    pub async fn read_native_tile(
        &self,
        level: &VirtualLevel,
        resolution: u32,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TileError> {
        let tile_size = self.descriptor.tile_size();
        let (width, height) = level.tile_dimensions(tile_x, tile_y, tile_size);
        let tile = tile_y * level.tiles_x + tile_x;

        let decode_failure = |message: String| TileError::DecodeFailure {
            resolution,
            tile,
            message,
        };

        let mut session = self.session.lock().await;

        session
            .set_current_level(level.native_level)
            .map_err(|e| decode_failure(e.to_string()))?;

        // Sample layout may differ between native levels
        let format = session
            .pixel_format()
            .map_err(|e| decode_failure(e.to_string()))?;
        check_format(&format)?;

        let raw = session
            .read_region(
                level.native_level,
                tile_x * tile_size,
                tile_y * tile_size,
                width,
                height,
            )
            .await
            .map_err(|e| {
                warn!(path = %self.path, resolution, tile, error = %e, "native read failed");
                decode_failure(e.to_string())
            })?;
        drop(session);

        let expected = format.region_len(width, height);
        if raw.len() != expected {
            warn!(
                path = %self.path,
                resolution,
                tile,
                expected,
                received = raw.len(),
                "unexpected byte count"
            );
            return Err(decode_failure(format!(
                "expected {expected} bytes, received {}",
                raw.len()
            )));
        }

        let pixels = normalize_to_rgb8(&raw, width, height, &format)
            .map_err(|e| e.into_tile_error(resolution, tile))?;
        Ok(Bytes::from(pixels))
    }
}

impl<S: ImageSource> CacheEntry for OpenImage<S> {
    fn cache_key(&self) -> String {
        self.path.to_string()
    }

    /// Image caches are budgeted by handle count.
    fn size_contribution(&self, _key: &str) -> usize {
        1
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}
