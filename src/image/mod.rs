//! Open image handles and their registry.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             ImageRegistry               │
//! │  ObjectCache<OpenImage> keyed by path,  │
//! │  mtime check on hit, singleflight open  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               OpenImage                 │
//! │  PixelFormat + PyramidDescriptor +      │
//! │  pooled DecodeSession                   │
//! └─────────────────────────────────────────┘
//! ```

mod open;
mod registry;

pub use open::OpenImage;
pub use registry::{ImageRegistry, DEFAULT_IMAGE_CACHE_CAPACITY};
