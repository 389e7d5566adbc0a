use crate::backend::{ByteOrder, PixelFormat, SampleFormat};
use crate::error::{NormalizeError, TileError};

/// Reject formats the normalizer cannot render faithfully.
///
/// Only 3- and 4-channel data is handled. Indexed colour needs a lookup
/// table unless it is flagged false-colour. A reported dimension order must
/// carry channels third (`XYC..`). Float and double samples must have their
/// natural widths.
pub fn check_format(format: &PixelFormat) -> Result<(), TileError> {
    match format_problem(format) {
        Some(reason) => Err(TileError::UnsupportedFormat { reason }),
        None => Ok(()),
    }
}

fn format_problem(format: &PixelFormat) -> Option<String> {
    if format.channels != 3 && format.channels != 4 {
        return Some(format!(
            "only 3 or 4 channels are supported, not {}",
            format.channels
        ));
    }

    if format.indexed && !format.false_color {
        return Some("indexed colour without a usable lookup table".to_string());
    }

    if let Some(order) = format.dimension_order.as_deref() {
        if !order.is_empty() && order.as_bytes().get(2) != Some(&b'C') {
            return Some(format!("unfamiliar dimension order {order}"));
        }
    }

    if format.bytes_per_sample == 0 {
        return Some("zero bytes per sample".to_string());
    }

    let natural = match format.sample {
        SampleFormat::Float => Some(4),
        SampleFormat::Double => Some(8),
        SampleFormat::Bit => Some(1),
        SampleFormat::Unsigned | SampleFormat::Signed => None,
    };
    match natural {
        Some(width) if format.bytes_per_sample != width => Some(format!(
            "{:?} samples must be {width} bytes wide, not {}",
            format.sample, format.bytes_per_sample
        )),
        _ => None,
    }
}

/// Convert one tile of decoder output to interleaved, unsigned RGB8.
///
/// `raw` must hold exactly `format.region_len(width, height)` bytes. Samples
/// are first reduced to one byte (float and double scaled by 255 and
/// truncated, wider integers cut to their most significant byte, bits
/// expanded to 0/255), then planar data is interleaved or a fourth channel
/// dropped, and finally signed data is re-biased by 128.
pub fn normalize_to_rgb8(
    raw: &[u8],
    width: u32,
    height: u32,
    format: &PixelFormat,
) -> Result<Vec<u8>, NormalizeError> {
    if let Some(reason) = format_problem(format) {
        return Err(NormalizeError::UnsupportedFormat { reason });
    }

    let pixels = width as usize * height as usize;
    let channels = format.channels as usize;
    let samples = pixels * channels;

    let expected = format.region_len(width, height);
    if raw.len() != expected {
        return Err(NormalizeError::LengthMismatch {
            expected,
            received: raw.len(),
        });
    }

    let reduced = reduce_samples(raw, samples, format);

    let mut out = if !format.interleaved {
        // Planes are stored R, G, B (then A); only the first three are used
        let mut out = vec![0u8; pixels * 3];
        for (c, plane) in reduced.chunks_exact(pixels.max(1)).take(3).enumerate() {
            for (i, &value) in plane.iter().enumerate() {
                out[i * 3 + c] = value;
            }
        }
        out
    } else if channels == 4 {
        reduced
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    } else {
        reduced
    };

    if format.sample == SampleFormat::Signed {
        for value in out.iter_mut() {
            *value = value.wrapping_add(128);
        }
    }

    Ok(out)
}

/// Reduce every sample to a single byte, preserving layout order.
fn reduce_samples(raw: &[u8], samples: usize, format: &PixelFormat) -> Vec<u8> {
    let width = format.bytes_per_sample as usize;
    let little = format.byte_order == ByteOrder::Little;

    match format.sample {
        SampleFormat::Float => raw
            .chunks_exact(4)
            .take(samples)
            .map(|chunk| {
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                let value = if little {
                    f32::from_le_bytes(bytes)
                } else {
                    f32::from_be_bytes(bytes)
                };
                (value * 255.0) as u8
            })
            .collect(),
        SampleFormat::Double => raw
            .chunks_exact(8)
            .take(samples)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                let value = if little {
                    f64::from_le_bytes(bytes)
                } else {
                    f64::from_be_bytes(bytes)
                };
                (value as f32 * 255.0) as u8
            })
            .collect(),
        SampleFormat::Bit => raw
            .iter()
            .take(samples)
            .map(|&bit| 0u8.wrapping_sub(bit))
            .collect(),
        SampleFormat::Unsigned | SampleFormat::Signed if width > 1 => {
            let pick = if little { width - 1 } else { 0 };
            raw.chunks_exact(width)
                .take(samples)
                .map(|chunk| chunk[pick])
                .collect()
        }
        SampleFormat::Unsigned | SampleFormat::Signed => raw[..samples].to_vec(),
    }
}
