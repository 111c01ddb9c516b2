//! Cookie Jar
//!
//! Cookies identify cancellable, repliable in-flight operations. A
//! cookie pairs a one-shot reply channel (how external input reaches a
//! blocked Wait handler) with a cancellation channel long-running code
//! selects on at every suspension point. The jar is the registry:
//! every operation on an unknown id is a typed error, never undefined
//! behavior.
//!
//! The jar mutex only guards bookkeeping; nothing blocks while it is
//! held.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Process-unique identifier of one in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CookieId(u64);

impl fmt::Display for CookieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cookie#{}", self.0)
    }
}

struct Entry {
    reply_tx: Sender<String>,
    reply_rx: Receiver<String>,
    /// Dropped on cancel; receivers observe the disconnect.
    cancel_tx: Option<Sender<()>>,
    cancel_rx: Receiver<()>,
}

impl Entry {
    fn cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }
}

/// Registry of open cookies.
#[derive(Default)]
pub struct CookieJar {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl CookieJar {
    /// An empty jar. Ids start at 1 and are never reused.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a fresh cookie.
    pub fn new_cookie(&self) -> CookieId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = bounded(1);
        let (cancel_tx, cancel_rx) = bounded(0);
        self.lock().insert(
            id,
            Entry {
                reply_tx,
                reply_rx,
                cancel_tx: Some(cancel_tx),
                cancel_rx,
            },
        );
        debug!("opened cookie#{id}");
        CookieId(id)
    }

    /// Deliver external data to whoever is blocked in [`receive`] for
    /// this cookie. The reply is buffered, so it may arrive before the
    /// receiver blocks.
    ///
    /// [`receive`]: CookieJar::receive
    pub fn reply(&self, id: CookieId, data: impl Into<String>) -> Result<(), CookieError> {
        let entries = self.lock();
        let entry = entries.get(&id.0).ok_or(CookieError::UnknownCookie(id))?;
        if entry.cancelled() {
            return Err(CookieError::Cancelled(id));
        }
        match entry.reply_tx.try_send(data.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CookieError::AlreadyReplied(id)),
            // receive side gone: the cookie was deleted concurrently
            Err(TrySendError::Disconnected(_)) => Err(CookieError::UnknownCookie(id)),
        }
    }

    /// Signal cancellation. Idempotent: cancelling an already-cancelled
    /// or already-completed cookie is a no-op; only an unknown (e.g.
    /// deleted) id is an error.
    pub fn cancel(&self, id: CookieId) -> Result<(), CookieError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(&id.0)
            .ok_or(CookieError::UnknownCookie(id))?;
        if let Some(tx) = entry.cancel_tx.take() {
            debug!("cancelled {id}");
            drop(tx);
        }
        Ok(())
    }

    /// Remove the cookie's bookkeeping. Every later jar operation on
    /// this id reports an unknown cookie.
    pub fn delete(&self, id: CookieId) -> Result<(), CookieError> {
        let removed = self.lock().remove(&id.0);
        match removed {
            Some(_) => {
                debug!("deleted {id}");
                Ok(())
            }
            None => Err(CookieError::UnknownCookie(id)),
        }
    }

    /// Block until a reply or a cancellation arrives for this cookie.
    pub fn receive(&self, id: CookieId) -> Result<String, CookieError> {
        let (reply_rx, cancel_rx) = self.receivers(id)?;
        select! {
            recv(reply_rx) -> msg => msg.map_err(|_| CookieError::Cancelled(id)),
            recv(cancel_rx) -> _ => Err(CookieError::Cancelled(id)),
        }
    }

    /// Like [`CookieJar::receive`] with an upper bound on the wait.
    pub fn receive_timeout(&self, id: CookieId, timeout: Duration) -> Result<String, CookieError> {
        let (reply_rx, cancel_rx) = self.receivers(id)?;
        select! {
            recv(reply_rx) -> msg => msg.map_err(|_| CookieError::Cancelled(id)),
            recv(cancel_rx) -> _ => Err(CookieError::Cancelled(id)),
            default(timeout) => Err(CookieError::Timeout(id)),
        }
    }

    /// A receiver a long-running operation can select on at its
    /// suspension points; it becomes ready when the cookie is cancelled
    /// or deleted.
    pub fn cancelled(&self, id: CookieId) -> Result<Receiver<()>, CookieError> {
        let entries = self.lock();
        let entry = entries.get(&id.0).ok_or(CookieError::UnknownCookie(id))?;
        Ok(entry.cancel_rx.clone())
    }

    /// Number of open cookies.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no cookies are open.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn receivers(&self, id: CookieId) -> Result<(Receiver<String>, Receiver<()>), CookieError> {
        let entries = self.lock();
        let entry = entries.get(&id.0).ok_or(CookieError::UnknownCookie(id))?;
        Ok((entry.reply_rx.clone(), entry.cancel_rx.clone()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cookie registry failures. All jar operations are total: unknown ids
/// produce this error, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("unknown {0}")]
    UnknownCookie(CookieId),

    #[error("{0} was cancelled")]
    Cancelled(CookieId),

    #[error("{0} already has an undelivered reply")]
    AlreadyReplied(CookieId),

    #[error("timed out waiting for a reply on {0}")]
    Timeout(CookieId),
}
