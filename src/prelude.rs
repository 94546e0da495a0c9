//! Convenience re-exports for common use.

pub use crate::config::SubtrackConfig;
pub use crate::connectivity::{ConnectivityMonitor, ConnectivitySignal, ManualSignal};
pub use crate::data::{DataAccess, Fetched, RemoteResult};
pub use crate::error::{
    generate_actions, AppError, ErrorCenter, ErrorKind, RecoveryCallbacks, Result, SubtrackError,
};
pub use crate::exchange::{ExchangeRateService, RateState, RefreshResult};
pub use crate::session::CoreSession;
pub use crate::stats::{aggregate, AggregateResult, Currency, SubscriptionRecord};
pub use crate::util::retry::{RetryExecutor, RetryOutcome, RetryPolicy};
