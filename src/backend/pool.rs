use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::BackendError;

use super::{DecodeSession, ImageSource};

/// Free list of decode sessions.
///
/// Sessions are expensive to create (a vendor SDK may spin up a thread or a
/// VM attachment per session), so they are recycled. The pool has its own
/// lock and is never touched while a cache lock is held.
pub struct SessionPool<S: ImageSource> {
    source: Arc<S>,
    idle: Mutex<Vec<S::Session>>,
    created: AtomicUsize,
}

impl<S: ImageSource> SessionPool<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// The source sessions are created from.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Take an idle session or create a new one.
    ///
    /// Idle sessions were closed on release, so callers always receive a
    /// session with nothing open.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledSession<S>, BackendError> {
        let recycled = self.lock_idle().pop();

        let session = match recycled {
            Some(session) => {
                debug!("reusing pooled decode session");
                session
            }
            None => {
                let session = self.source.create_session().await?;
                let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(total, "created decode session");
                session
            }
        };

        Ok(PooledSession {
            session: Some(session),
            pool: Arc::clone(self),
        })
    }

    /// Number of sessions waiting in the free list.
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// Number of sessions ever created by this pool.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Close `session` and put it on the free list.
    ///
    /// Idle sessions hold no file, so an evicted image does not keep its
    /// decoder state alive.
    fn release(&self, mut session: S::Session) {
        session.close();
        self.lock_idle().push(session);
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<S::Session>> {
        // The free list holds no invariants a panic could break
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A session checked out of a [`SessionPool`].
///
/// Dereferences to the session. Dropping the guard returns the session to the
/// pool exactly once.
pub struct PooledSession<S: ImageSource> {
    session: Option<S::Session>,
    pool: Arc<SessionPool<S>>,
}

impl<S: ImageSource> Deref for PooledSession<S> {
    type Target = S::Session;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session,
            None => unreachable!("session is only taken on drop"),
        }
    }
}

impl<S: ImageSource> DerefMut for PooledSession<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("session is only taken on drop"),
        }
    }
}

impl<S: ImageSource> Drop for PooledSession<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
