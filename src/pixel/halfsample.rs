//! 2×2 area-average reduction and quadrant composition for RGB8 buffers.
//!
//! Averaging uses `avg(a, b) = ((a ^ b) >> 1) + (a & b)`, which never
//! overflows. Masking the xor with `0xFE` in every byte lane stops the shift
//! from carrying a bit across lanes, so eight bytes (two RGB pixels plus two
//! spare bytes) are averaged in one `u64` operation.

const LANE_MASK_32: u32 = 0xFEFE_FEFE;
const LANE_MASK_64: u64 = 0xFEFE_FEFE_FEFE_FEFE;
const RGB_MASK: u64 = 0x00FF_FFFF;

/// Bytewise floor average of four packed lanes.
#[inline]
pub fn avg_packed(a: u32, b: u32) -> u32 {
    (((a ^ b) & LANE_MASK_32) >> 1) + (a & b)
}

#[inline]
fn avg_packed64(a: u64, b: u64) -> u64 {
    (((a ^ b) & LANE_MASK_64) >> 1) + (a & b)
}

#[inline]
fn avg_byte(a: u8, b: u8) -> u8 {
    ((a ^ b) >> 1) + (a & b)
}

#[inline]
fn load_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Average the 2×2 block whose top-left pixel starts at `top`, reading
/// eight bytes from each row.
#[inline]
fn kernel_packed(src: &[u8], top: usize, bottom: usize) -> [u8; 3] {
    let vertical = avg_packed64(load_u64(src, top), load_u64(src, bottom));
    let left = (vertical & RGB_MASK) as u32;
    let right = ((vertical >> 24) & RGB_MASK) as u32;
    let [r, g, b, _] = avg_packed(left, right).to_le_bytes();
    [r, g, b]
}

/// Same result as [`kernel_packed`], touching only the six bytes of the block.
#[inline]
fn kernel_scalar(src: &[u8], top: usize, bottom: usize) -> [u8; 3] {
    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let left = avg_byte(src[top + c], src[bottom + c]);
        let right = avg_byte(src[top + 3 + c], src[bottom + 3 + c]);
        *value = avg_byte(left, right);
    }
    out
}

/// Halve an interleaved RGB8 image in both directions.
///
/// The output is `floor(width / 2) × floor(height / 2)`; an odd last row or
/// column is dropped. Returns an empty buffer when either output dimension
/// is zero.
///
/// # Panics
///
/// Panics if `src` is shorter than `width * height * 3` bytes.
pub fn halfsample(src: &[u8], width: u32, height: u32) -> Vec<u8> {
    let out_width = (width / 2) as usize;
    let out_height = (height / 2) as usize;
    if out_width == 0 || out_height == 0 {
        return Vec::new();
    }

    let stride = width as usize * 3;
    assert!(
        src.len() >= stride * height as usize,
        "halfsample input holds {} bytes, {}x{} RGB needs {}",
        src.len(),
        width,
        height,
        stride * height as usize
    );

    let mut out = vec![0u8; out_width * out_height * 3];

    for j in 0..out_height {
        let top_row = 2 * j * stride;
        let bottom_row = top_row + stride;
        let last_row = j + 1 == out_height;

        for i in 0..out_width {
            let top = top_row + 6 * i;
            let bottom = bottom_row + 6 * i;

            // The eight-byte load of the final block can run past the end of
            // the buffer; everything before it has at least two spare bytes.
            let pixel = if last_row && i + 1 == out_width {
                kernel_scalar(src, top, bottom)
            } else {
                kernel_packed(src, top, bottom)
            };

            let dst = (j * out_width + i) * 3;
            out[dst..dst + 3].copy_from_slice(&pixel);
        }
    }

    out
}

/// Copy an RGB8 image into `dest` with its top-left corner at `(x, y)`.
///
/// # Panics
///
/// Panics if the source rectangle does not fit inside the destination.
#[allow(clippy::too_many_arguments)]
pub fn compose(
    dest: &mut [u8],
    dest_width: u32,
    dest_height: u32,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    x: u32,
    y: u32,
) {
    if src_width == 0 || src_height == 0 {
        return;
    }

    assert!(
        x + src_width <= dest_width && y + src_height <= dest_height,
        "{}x{} at ({}, {}) does not fit in {}x{}",
        src_width,
        src_height,
        x,
        y,
        dest_width,
        dest_height
    );

    let dest_stride = dest_width as usize * 3;
    let row_len = src_width as usize * 3;
    assert!(dest.len() >= dest_stride * dest_height as usize);
    assert!(src.len() >= row_len * src_height as usize);

    for row in 0..src_height as usize {
        let from = row * row_len;
        let to = (y as usize + row) * dest_stride + x as usize * 3;
        dest[to..to + row_len].copy_from_slice(&src[from..from + row_len]);
    }
}
