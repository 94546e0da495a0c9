//! subtrack: resilient data-access core for a subscription tracker.
//!
//! Wraps every network-bound call in retry with capped exponential backoff,
//! classifies failures into a fixed taxonomy with localized messages and
//! recovery actions, tracks connectivity, keeps a fault-tolerant exchange
//! rate, and aggregates subscription prices with per-item fault isolation.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use subtrack::prelude::*;
//!
//! # async fn example() -> subtrack::error::Result<()> {
//! let signal = Arc::new(ManualSignal::new(true));
//! let session = CoreSession::start(SubtrackConfig::load()?, signal)?;
//!
//! let records = vec![SubscriptionRecord::new("netflix", 17000.0, Currency::Krw)];
//! println!("{}", session.summary(&records).formatted_total());
//!
//! session.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod data;
pub mod error;
pub mod exchange;
pub mod prelude;
pub mod session;
pub mod stats;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
