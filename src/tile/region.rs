use serde::Serialize;
use tracing::debug;

use crate::backend::ImageSource;
use crate::error::TileError;
use crate::image::OpenImage;
use crate::pixel::RGB_CHANNELS;

use super::resolver::TileResolver;

/// An interleaved RGB8 pixel rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// A black RGB8 buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: RGB_CHANNELS,
            data: vec![0; width as usize * height as usize * RGB_CHANNELS as usize],
        }
    }

    /// The three bytes of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS as usize;
        &self.data[offset..offset + RGB_CHANNELS as usize]
    }
}

/// Stitches resolved tiles into arbitrary pixel rectangles.
pub struct RegionCompositor<'a> {
    resolver: &'a TileResolver,
}

impl<'a> RegionCompositor<'a> {
    pub fn new(resolver: &'a TileResolver) -> Self {
        Self { resolver }
    }

    /// Extract the rectangle `(x, y, width, height)` of a resolution level.
    ///
    /// Every tile intersecting the rectangle is resolved through the cache,
    /// cropped to the intersection and copied row by row.
    pub async fn region<S: ImageSource>(
        &self,
        image: &OpenImage<S>,
        resolution: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, TileError> {
        let descriptor = image.descriptor();
        let level = *descriptor.level(resolution)?;
        let tile_size = descriptor.tile_size();

        let fits = width > 0
            && height > 0
            && x as u64 + width as u64 <= level.width as u64
            && y as u64 + height as u64 <= level.height as u64;
        if !fits {
            return Err(TileError::RegionOutOfRange {
                resolution,
                x,
                y,
                width,
                height,
                level_width: level.width,
                level_height: level.height,
            });
        }

        let (first_x, last_x, first_y, last_y) =
            if x == 0 && y == 0 && width == level.width && height == level.height {
                (0, level.tiles_x, 0, level.tiles_y)
            } else {
                (
                    x / tile_size,
                    (x + width).div_ceil(tile_size),
                    y / tile_size,
                    (y + height).div_ceil(tile_size),
                )
            };

        debug!(
            path = image.path(),
            resolution,
            x,
            y,
            width,
            height,
            tiles = (last_x - first_x) * (last_y - first_y),
            "compositing region"
        );

        let mut out = PixelBuffer::new(width, height);
        let out_stride = width as usize * 3;

        for tile_y in first_y..last_y {
            for tile_x in first_x..last_x {
                let tile = tile_y * level.tiles_x + tile_x;
                let resolved = self.resolver.get_tile(image, resolution, tile).await?;
                let record = resolved.record;

                let origin_x = tile_x * tile_size;
                let origin_y = tile_y * tile_size;

                // Intersection of the tile with the requested rectangle
                let left = x.max(origin_x);
                let right = (x + width).min(origin_x + record.width());
                let top = y.max(origin_y);
                let bottom = (y + height).min(origin_y + record.height());
                if left >= right || top >= bottom {
                    continue;
                }

                let row_len = (right - left) as usize * 3;
                let tile_stride = record.width() as usize * 3;
                let data = record.data();

                for row in top..bottom {
                    let from = (row - origin_y) as usize * tile_stride + (left - origin_x) as usize * 3;
                    let to = (row - y) as usize * out_stride + (left - x) as usize * 3;
                    out.data[to..to + row_len].copy_from_slice(&data[from..from + row_len]);
                }
            }
        }

        Ok(out)
    }
}
