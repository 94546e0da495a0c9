//! Cancellable background tasks and latest-request-wins slots.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owned handle to a spawned background task.
///
/// The task receives a [`CancellationToken`] and is expected to stop at its
/// next await point once it fires. Dropping the handle cancels the token, so
/// timers cannot outlive their owner.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `f` with a fresh token.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(CancellationToken::new(), f)
    }

    /// Spawn `f` with a token that is also cancelled when `parent` is.
    pub fn spawn_child<F, Fut>(parent: &CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(parent.child_token(), f)
    }

    fn spawn_with_token<F, Fut>(token: CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join = tokio::spawn(f(token.clone()));
        Self {
            token,
            join: Some(join),
        }
    }

    /// Signal the task to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    /// Whether the task is still pending and has not been told to stop.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }

    /// Cancel and wait for the task to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                if e.is_panic() {
                    tracing::warn!(error = %e, "Background task panicked");
                }
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Identifies one request issued through a [`RequestSlot`].
#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    token: CancellationToken,
}

impl RequestTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Latest-request-wins slot for one logical resource.
///
/// Beginning a new request cancels the previous one, so a superseded
/// response can never land after a newer one.
#[derive(Debug, Default)]
pub struct RequestSlot {
    next_id: AtomicU64,
    current: Mutex<Option<RequestTicket>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, cancelling whichever one was in flight.
    pub fn begin(&self) -> RequestTicket {
        self.begin_with(CancellationToken::new())
    }

    /// Like [`begin`](Self::begin), but the request is also cancelled when
    /// `parent` is.
    pub fn begin_child(&self, parent: &CancellationToken) -> RequestTicket {
        self.begin_with(parent.child_token())
    }

    fn begin_with(&self, token: CancellationToken) -> RequestTicket {
        let ticket = RequestTicket {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token,
        };
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ticket.clone());
        if let Some(previous) = previous {
            tracing::debug!(superseded = previous.id, by = ticket.id, "Cancelling superseded request");
            previous.token.cancel();
        }
        ticket
    }

    /// Whether `ticket` is still the most recent request.
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|current| current.id == ticket.id)
            .unwrap_or(false)
    }

    /// Release the slot if `ticket` still owns it.
    pub fn finish(&self, ticket: &RequestTicket) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().map(|c| c.id) == Some(ticket.id) {
            *current = None;
        }
    }

    /// Whether no request is in flight.
    pub fn is_idle(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Cancel whatever is in flight.
    pub fn cancel(&self) {
        if let Some(ticket) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ticket.token.cancel();
        }
    }
}
