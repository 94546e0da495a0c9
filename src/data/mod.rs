//! Uniform retry and classification around remote data-access calls.
//!
//! Remote reads, writes and deletes are external collaborators returning a
//! `(data, error)` pair. [`DataAccess`] runs them through the shared
//! [`RetryExecutor`] and converts every failure into an [`AppError`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ErrorCenter, ErrorSource};
use crate::util::retry::{RetryExecutor, RetryPolicy};
use crate::util::task::{RequestSlot, RequestTicket};

/// `(data, error)` pair as produced by a remote store client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult<T> {
    pub data: Option<T>,
    pub error: Option<Value>,
}

impl<T> RemoteResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A successful call that returned no rows.
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(error: impl Into<Value>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }

    /// An error payload wins over any data.
    pub fn into_result(self) -> Result<Option<T>, ErrorSource> {
        match self.error {
            Some(Value::Null) | None => Ok(self.data),
            Some(error) => Err(ErrorSource::from_json(&error)),
        }
    }
}

/// Outcome of [`DataAccess::execute_latest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Done(Option<T>),
    /// A newer request for the same key took over; this result was dropped.
    Superseded,
}

impl<T> Fetched<T> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Done(data) => data,
            Self::Superseded => None,
        }
    }
}

/// Wraps remote calls with retry, classification and error reporting.
///
/// Failures are recorded in the shared [`ErrorCenter`]; a call that only
/// succeeded after retrying clears the current error. Every call runs under
/// a scope token, so [`cancel_all`](Self::cancel_all) and
/// [`shutdown`](Self::shutdown) reach plain `execute` calls as well as
/// keyed ones. Cancelled calls are not recorded.
#[derive(Clone)]
pub struct DataAccess {
    executor: RetryExecutor,
    policy: RetryPolicy,
    errors: ErrorCenter,
    slots: Arc<Mutex<HashMap<String, Arc<RequestSlot>>>>,
    /// Cancelled once, on shutdown.
    root: CancellationToken,
    /// Child of `root`; replaced by `cancel_all`.
    scope: Arc<Mutex<CancellationToken>>,
}

impl DataAccess {
    pub fn new(executor: RetryExecutor, policy: RetryPolicy) -> Self {
        Self::with_error_center(executor, policy, ErrorCenter::new())
    }

    pub fn with_error_center(executor: RetryExecutor, policy: RetryPolicy, errors: ErrorCenter) -> Self {
        let root = CancellationToken::new();
        let scope = root.child_token();
        Self {
            executor,
            policy,
            errors,
            slots: Arc::new(Mutex::new(HashMap::new())),
            root,
            scope: Arc::new(Mutex::new(scope)),
        }
    }

    pub fn errors(&self) -> &ErrorCenter {
        &self.errors
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Run `operation` with retry. `context` describes the user action.
    pub async fn execute<F, Fut, T>(&self, operation: F, context: &str) -> Result<Option<T>, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let token = self.call_token();
        let (attempts, result) = self.run(operation, context, &token).await;
        self.settle(attempts, result, &token)
    }

    /// Like [`execute`](Self::execute), additionally stopped by `cancel`.
    pub async fn execute_with_cancel<F, Fut, T>(
        &self,
        operation: F,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let token = self.call_token();
        let run = self.run(operation, context, &token);
        tokio::pin!(run);
        let (attempts, result) = tokio::select! {
            biased;
            outcome = &mut run => outcome,
            _ = cancel.cancelled() => {
                token.cancel();
                run.await
            }
        };
        self.settle(attempts, result, &token)
    }

    /// Run `operation` as the latest request for `key`.
    ///
    /// Starting a new request for the same key cancels the in-flight one;
    /// the superseded call resolves to [`Fetched::Superseded`] and reports
    /// nothing. So does a call stopped by `cancel_all` or `shutdown`.
    pub async fn execute_latest<F, Fut, T>(
        &self,
        key: &str,
        operation: F,
        context: &str,
    ) -> Result<Fetched<T>, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let (slot, ticket) = self.begin(key);
        let (attempts, result) = self.run(operation, context, ticket.token()).await;

        let superseded = ticket.is_cancelled() || !slot.is_current(&ticket);
        self.release(key, &slot, &ticket);
        if superseded {
            tracing::debug!(key, context, "Dropping superseded response");
            return Ok(Fetched::Superseded);
        }
        self.settle(attempts, result, ticket.token()).map(Fetched::Done)
    }

    /// Cancel every in-flight request. Later calls run normally.
    pub fn cancel_all(&self) {
        let previous = {
            let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *scope, self.root.child_token())
        };
        previous.cancel();

        let slots: Vec<Arc<RequestSlot>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for slot in slots {
            slot.cancel();
        }
    }

    /// Cancel every in-flight request and refuse new ones. Irreversible.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.cancel_all();
        tracing::debug!("Data access shut down");
    }

    fn call_token(&self) -> CancellationToken {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    /// Look up the slot for `key` and start a request in it. Done under the
    /// map lock so `release` never drops a slot that is about to be used.
    fn begin(&self, key: &str) -> (Arc<RequestSlot>, RequestTicket) {
        let parent = self.call_token();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.to_string()).or_default().clone();
        let ticket = slot.begin_child(&parent);
        (slot, ticket)
    }

    fn release(&self, key: &str, slot: &Arc<RequestSlot>, ticket: &RequestTicket) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slot.finish(ticket);
        if slot.is_idle() && slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(key);
        }
    }

    async fn run<F, Fut, T>(
        &self,
        mut operation: F,
        context: &str,
        cancel: &CancellationToken,
    ) -> (u32, Result<Option<T>, AppError>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let outcome = self
            .executor
            .run_with_cancel(
                || {
                    let call = operation();
                    async move { call.await.into_result() }
                },
                &self.policy,
                context,
                cancel,
            )
            .await;
        (outcome.attempts_made, outcome.into_result())
    }

    fn settle<T>(
        &self,
        attempts: u32,
        result: Result<Option<T>, AppError>,
        token: &CancellationToken,
    ) -> Result<Option<T>, AppError> {
        match result {
            Ok(data) => {
                if attempts > 1 {
                    self.errors.clear();
                }
                Ok(data)
            }
            Err(error) if token.is_cancelled() => {
                tracing::debug!(context = ?error.context, "Request cancelled; not recorded");
                Err(error)
            }
            Err(error) => {
                self.errors.record(error.clone());
                Err(error)
            }
        }
    }
}
