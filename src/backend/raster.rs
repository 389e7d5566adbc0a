//! Decode session over ordinary raster files (PNG, JPEG).
//!
//! The whole file is decoded to RGB8 once per open, on a blocking thread, and
//! a small native ladder is derived by repeated triangle-filter reduction.
//! This gives the pyramid engine a realistic non-power-of-two ladder to work
//! against without a slide SDK.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use tracing::debug;

use crate::error::BackendError;

use super::{DecodeSession, ImageSource, PixelFormat};

/// Default size ratio between consecutive native levels.
pub const DEFAULT_LEVEL_RATIO: u32 = 4;

/// Default maximum number of native levels.
pub const DEFAULT_MAX_NATIVE_LEVELS: usize = 4;

// =============================================================================
// RasterSource
// =============================================================================

/// [`ImageSource`] for files the `image` crate can decode.
#[derive(Debug, Clone)]
pub struct RasterSource {
    level_ratio: u32,
    max_native_levels: usize,
    tile_hint: Option<u32>,
}

impl Default for RasterSource {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_RATIO, DEFAULT_MAX_NATIVE_LEVELS)
    }
}

impl RasterSource {
    /// Create a source whose native ladder shrinks by `level_ratio` per level,
    /// with at most `max_native_levels` levels.
    pub fn new(level_ratio: u32, max_native_levels: usize) -> Self {
        Self {
            level_ratio: level_ratio.max(2),
            max_native_levels: max_native_levels.max(1),
            tile_hint: None,
        }
    }

    /// Report `width` as the format's optimal tile width.
    pub fn with_tile_hint(mut self, width: u32) -> Self {
        self.tile_hint = Some(width);
        self
    }
}

#[async_trait]
impl ImageSource for RasterSource {
    type Session = RasterSession;

    async fn create_session(&self) -> Result<Self::Session, BackendError> {
        Ok(RasterSession {
            level_ratio: self.level_ratio,
            max_native_levels: self.max_native_levels,
            tile_hint: self.tile_hint,
            levels: None,
            current: 0,
        })
    }

    async fn modified(&self, path: &str) -> Result<SystemTime, BackendError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| BackendError::Open(format!("{path}: {e}")))?;
        metadata
            .modified()
            .map_err(|e| BackendError::Open(format!("{path}: {e}")))
    }
}

// =============================================================================
// RasterSession
// =============================================================================

/// Session holding the decoded native ladder of one raster file.
pub struct RasterSession {
    level_ratio: u32,
    max_native_levels: usize,
    tile_hint: Option<u32>,
    levels: Option<Arc<Vec<RgbImage>>>,
    current: usize,
}

impl RasterSession {
    fn levels(&self) -> Result<&[RgbImage], BackendError> {
        self.levels
            .as_deref()
            .map(Vec::as_slice)
            .ok_or(BackendError::NotOpen)
    }

    fn level(&self, level: usize) -> Result<&RgbImage, BackendError> {
        let levels = self.levels()?;
        levels.get(level).ok_or(BackendError::NoSuchLevel {
            level,
            count: levels.len(),
        })
    }
}

#[async_trait]
impl DecodeSession for RasterSession {
    async fn open(&mut self, path: &str) -> Result<(), BackendError> {
        let owned = path.to_string();
        let ratio = self.level_ratio;
        let max_levels = self.max_native_levels;

        let levels = tokio::task::spawn_blocking(move || decode_ladder(&owned, ratio, max_levels))
            .await
            .map_err(|e| BackendError::Open(format!("decode task failed: {e}")))??;

        debug!(
            path,
            levels = levels.len(),
            width = levels[0].width(),
            height = levels[0].height(),
            "decoded raster ladder"
        );

        self.levels = Some(Arc::new(levels));
        self.current = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.levels = None;
        self.current = 0;
    }

    fn resolution_count(&self) -> Result<usize, BackendError> {
        Ok(self.levels()?.len())
    }

    fn set_current_level(&mut self, level: usize) -> Result<(), BackendError> {
        self.level(level)?;
        self.current = level;
        Ok(())
    }

    fn dimensions(&self) -> Result<(u32, u32), BackendError> {
        Ok(self.level(self.current)?.dimensions())
    }

    fn optimal_tile_width(&self) -> Option<u32> {
        self.tile_hint
    }

    fn pixel_format(&self) -> Result<PixelFormat, BackendError> {
        self.levels()?;
        Ok(PixelFormat::rgb8())
    }

    async fn read_region(
        &mut self,
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Bytes, BackendError> {
        let image = self.level(level)?;
        let (level_width, level_height) = image.dimensions();

        if x as u64 + width as u64 > level_width as u64
            || y as u64 + height as u64 > level_height as u64
        {
            return Err(BackendError::Read(format!(
                "region {width}x{height}+{x}+{y} exceeds level {level} ({level_width}x{level_height})"
            )));
        }

        let stride = level_width as usize * 3;
        let row_len = width as usize * 3;
        let raw = image.as_raw();

        let mut out = Vec::with_capacity(row_len * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * stride + x as usize * 3;
            out.extend_from_slice(&raw[start..start + row_len]);
        }

        Ok(Bytes::from(out))
    }
}

/// Decode `path` and build the reduced native ladder.
fn decode_ladder(path: &str, ratio: u32, max_levels: usize) -> Result<Vec<RgbImage>, BackendError> {
    let reader = ImageReader::open(Path::new(path))
        .map_err(|e| BackendError::Open(format!("{path}: {e}")))?
        .with_guessed_format()
        .map_err(|e| BackendError::Open(format!("{path}: {e}")))?;

    let base = reader
        .decode()
        .map_err(|e| BackendError::Open(format!("{path}: {e}")))?
        .to_rgb8();

    Ok(build_ladder(base, ratio, max_levels))
}

fn build_ladder(base: RgbImage, ratio: u32, max_levels: usize) -> Vec<RgbImage> {
    let mut levels = vec![base];

    while levels.len() < max_levels {
        let previous = &levels[levels.len() - 1];
        let width = previous.width() / ratio;
        let height = previous.height() / ratio;
        if width == 0 || height == 0 {
            break;
        }
        let reduced = imageops::resize(previous, width, height, FilterType::Triangle);
        levels.push(reduced);
    }

    levels
}
