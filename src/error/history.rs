//! Holder for the current error and a bounded history of recent ones.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use super::message::AppError;
use super::taxonomy::ErrorSource;

/// How many past errors are retained.
pub const HISTORY_LIMIT: usize = 10;

/// Tracks the error currently shown to the user plus recent history.
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ErrorCenter {
    inner: Arc<RwLock<ErrorCenterInner>>,
    current_tx: watch::Sender<Option<AppError>>,
}

#[derive(Default)]
struct ErrorCenterInner {
    current: Option<AppError>,
    history: VecDeque<AppError>,
}

impl Default for ErrorCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCenter {
    pub fn new() -> Self {
        let (current_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(RwLock::new(ErrorCenterInner::default())),
            current_tx,
        }
    }

    /// Classify `source`, make it the current error and append it to history.
    pub fn report(&self, source: impl Into<ErrorSource>, context: Option<&str>) -> AppError {
        let error = AppError::from_failure(source, context);
        self.record(error.clone());
        error
    }

    /// Make an already-built error current and append it to history.
    pub fn record(&self, error: AppError) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.history.len() == HISTORY_LIMIT {
            inner.history.pop_front();
        }
        inner.history.push_back(error.clone());
        inner.current = Some(error.clone());
        drop(inner);
        self.current_tx.send_replace(Some(error));
    }

    /// The error currently held for display.
    pub fn current(&self) -> Option<AppError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Recent errors, oldest first.
    pub fn history(&self) -> Vec<AppError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Dismiss the current error. History is kept.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
        self.current_tx.send_replace(None);
    }

    pub fn clear_history(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clear();
    }

    /// Subscribe to changes of the current error.
    pub fn watch(&self) -> watch::Receiver<Option<AppError>> {
        self.current_tx.subscribe()
    }

    /// Re-run a failed operation; success clears the current error.
    pub async fn retry<F, Fut, T, E>(&self, operation: F, context: &str) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ErrorSource>,
    {
        match operation().await {
            Ok(value) => {
                self.clear();
                Ok(value)
            }
            Err(e) => Err(self.report(e, Some(context))),
        }
    }
}
