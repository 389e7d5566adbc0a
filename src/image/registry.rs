//! Image registry: open-handle caching with staleness checks.
//!
//! The registry provides:
//! - An [`ObjectCache`] of open images keyed by path, budgeted by count
//! - Reopening when the file on disk is newer than the cached handle
//! - Singleflight so concurrent requests for one path open it once, on a
//!   task that outlives cancelled callers
//! - A shared [`SessionPool`] all images draw their decode sessions from

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tokio::sync::Notify;
use tracing::debug;

use crate::backend::{ImageSource, SessionPool};
use crate::cache::ObjectCache;
use crate::error::{BackendError, TileError};

use super::open::OpenImage;

/// Default number of open images to keep.
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 500;

type OpenResult<S> = Result<Arc<OpenImage<S>>, TileError>;

type InFlightMap<S> = Arc<Mutex<HashMap<String, Arc<InFlightState<S>>>>>;

/// State for an in-flight open.
struct InFlightState<S: ImageSource> {
    notify: Notify,
    result: Mutex<Option<OpenResult<S>>>,
}

impl<S: ImageSource> InFlightState<S> {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            result: Mutex::new(None),
        }
    }

    fn stored(&self) -> Option<OpenResult<S>> {
        lock(&self.result).clone()
    }

    fn store(&self, result: OpenResult<S>) {
        *lock(&self.result) = Some(result);
    }
}

/// Removes an in-flight entry and wakes its waiters when the open task ends,
/// including when it unwinds.
struct InFlightGuard<S: ImageSource> {
    path: String,
    state: Arc<InFlightState<S>>,
    in_flight: InFlightMap<S>,
}

impl<S: ImageSource> Drop for InFlightGuard<S> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.path);
        self.state.notify.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Neither map nor slot holds an invariant a panic could break
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of open images.
pub struct ImageRegistry<S: ImageSource> {
    source: Arc<S>,
    pool: Arc<SessionPool<S>>,
    images: Arc<ObjectCache<OpenImage<S>>>,
    in_flight: InFlightMap<S>,
}

impl<S: ImageSource> ImageRegistry<S> {
    /// Create a registry holding up to [`DEFAULT_IMAGE_CACHE_CAPACITY`] images.
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_IMAGE_CACHE_CAPACITY)
    }

    /// Create a registry holding up to `capacity` open images.
    ///
    /// A capacity of zero disables handle caching; every lookup reopens.
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let source = Arc::new(source);
        Self {
            pool: Arc::new(SessionPool::new(Arc::clone(&source))),
            source,
            images: Arc::new(ObjectCache::with_capacity(capacity)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The pool decode sessions are drawn from.
    pub fn pool(&self) -> &Arc<SessionPool<S>> {
        &self.pool
    }

    /// Get an open image, opening or reopening it as needed.
    ///
    /// A cached handle is returned only while the file's modification time
    /// is not newer than the handle's timestamp.
    pub async fn get_image(&self, path: &str) -> OpenResult<S> {
        let mut not_before = None;

        if let Some(image) = self.images.get(path).await {
            let modified = self
                .source
                .modified(path)
                .await
                .map_err(|source| TileError::OpenFailure {
                    path: path.to_string(),
                    source,
                })?;

            if modified <= image.timestamp() {
                return Ok(image);
            }
            debug!(path, "source file changed, reopening");
            not_before = Some(modified);
        }

        self.open_once(path, not_before).await
    }

    /// Open `path`, collapsing concurrent opens of the same path.
    ///
    /// The open itself runs on its own task, so it completes and populates
    /// the cache even if every caller waiting on it is dropped.
    async fn open_once(&self, path: &str, not_before: Option<SystemTime>) -> OpenResult<S> {
        let (state, leader) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(path) {
                Some(state) => (Arc::clone(state), false),
                None => {
                    let state = Arc::new(InFlightState::new());
                    in_flight.insert(path.to_string(), Arc::clone(&state));
                    (state, true)
                }
            }
        };

        // Register interest before the task can finish, so its notification
        // is not lost
        let notified = state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if leader {
            self.spawn_open(path, not_before, Arc::clone(&state));
        }

        if let Some(result) = state.stored() {
            return result;
        }

        notified.await;

        let stored = state.stored();
        match stored {
            Some(result) => result,
            // Only reached when the open task panicked
            None => Err(TileError::OpenFailure {
                path: path.to_string(),
                source: BackendError::Open("open was abandoned".to_string()),
            }),
        }
    }

    fn spawn_open(&self, path: &str, not_before: Option<SystemTime>, state: Arc<InFlightState<S>>) {
        let guard = InFlightGuard {
            path: path.to_string(),
            state: Arc::clone(&state),
            in_flight: Arc::clone(&self.in_flight),
        };
        let images = Arc::clone(&self.images);
        let pool = Arc::clone(&self.pool);
        let path = path.to_string();

        tokio::spawn(async move {
            let _guard = guard;

            // An open that finished between the caller's lookup and this task
            // may already have cached a fresh enough handle
            let cached = images
                .get(&path)
                .await
                .filter(|image| not_before.map_or(true, |time| image.timestamp() >= time));

            let result = match cached {
                Some(image) => Ok(image),
                None => {
                    let result = OpenImage::open(&path, &pool).await.map(Arc::new);
                    if let Ok(ref image) = result {
                        images.insert(Arc::clone(image)).await;
                    }
                    result
                }
            };

            state.store(result);
        });
    }

    /// Drop the cached handle for `path`.
    pub async fn invalidate(&self, path: &str) {
        self.images.remove(path).await;
    }

    /// Drop every cached handle.
    pub async fn clear(&self) {
        self.images.clear().await;
    }

    /// Number of cached handles.
    pub async fn cached_count(&self) -> usize {
        self.images.len().await
    }
}
