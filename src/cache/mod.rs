//! Memory-bounded object cache.
//!
//! One generic LRU cache serves both decoded tiles and open image handles.
//! Entries describe their own identity, accounting size and freshness through
//! the [`CacheEntry`] trait, and the cache keeps a running byte total that is
//! checked against a fixed budget after every insert.
//!
//! # Staleness
//!
//! Every entry carries the modification time of its source file as observed
//! when the image was opened. Inserting an entry whose key is already present
//! replaces the stored entry only when the incoming timestamp is strictly
//! newer; otherwise the stored copy is canonical and the insert is dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::UNIX_EPOCH;
//! use bytes::Bytes;
//! use wsi_pyramid::cache::ObjectCache;
//! use wsi_pyramid::tile::{TileKey, TileRecord};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: ObjectCache<TileRecord> = ObjectCache::with_capacity(1024 * 1024);
//!
//!     let record = TileRecord::rgb8("slides/a.png", 2, 5, 4, 4, Bytes::from(vec![0u8; 48]), UNIX_EPOCH);
//!     let key = record.key().to_string();
//!     cache.insert(Arc::new(record)).await;
//!
//!     assert!(cache.get(&key).await.is_some());
//! }
//! ```

mod object_cache;

pub use object_cache::{CacheEntry, CacheStats, InsertOutcome, ObjectCache};
