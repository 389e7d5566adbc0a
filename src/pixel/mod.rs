//! Pixel-level transforms on tile buffers.
//!
//! - [`normalize_to_rgb8`]: decoder-native sample layout to interleaved RGB8
//! - [`halfsample`]: 2×2 area-average reduction of an RGB8 buffer
//! - [`compose`]: copy a buffer into a larger one at a pixel offset
//!
//! Everything here is synchronous and allocation-light; callers decide which
//! thread it runs on.

mod halfsample;
mod normalize;

pub use halfsample::{avg_packed, compose, halfsample};
pub use normalize::{check_format, normalize_to_rgb8};

/// Channels in every tile the engine produces.
pub const RGB_CHANNELS: u32 = 3;
