//! Utility modules: retry, cancellable tasks, shared HTTP client.

pub mod http;
pub mod retry;
pub mod task;
