//! Wiring of the core services for one application session.

use std::sync::Arc;

use crate::config::SubtrackConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivitySignal, HttpProbe};
use crate::data::DataAccess;
use crate::error::Result;
use crate::exchange::ExchangeRateService;
use crate::stats::{aggregate, AggregateResult, SubscriptionRecord};
use crate::util::retry::RetryExecutor;

/// Owns the session-scoped services and tears them down together.
///
/// Every retrying caller shares one [`RetryExecutor`] bound to the
/// session's [`ConnectivityMonitor`].
pub struct CoreSession {
    config: SubtrackConfig,
    connectivity: ConnectivityMonitor,
    rates: ExchangeRateService,
    data: DataAccess,
}

impl CoreSession {
    /// Build the services without starting any background work.
    pub fn new(config: SubtrackConfig, signal: Arc<dyn ConnectivitySignal>) -> Result<Self> {
        config.validate()?;
        let probe = HttpProbe::new(
            config.connectivity.probe_url.clone(),
            config.connectivity.probe_timeout(),
        );
        let connectivity = ConnectivityMonitor::with_probe(signal, Arc::new(probe));
        let executor = RetryExecutor::with_connectivity(connectivity.clone());
        let policy = config.retry_policy();
        let rates = ExchangeRateService::new(config.exchange.clone(), policy.clone(), executor.clone())?;
        let data = DataAccess::new(executor, policy);

        Ok(Self {
            config,
            connectivity,
            rates,
            data,
        })
    }

    /// Build and start: connectivity events and periodic rate refresh.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: SubtrackConfig, signal: Arc<dyn ConnectivitySignal>) -> Result<Self> {
        let session = Self::new(config, signal)?;
        session.connectivity.init();
        session.rates.start();
        tracing::info!(
            online = session.connectivity.is_online(),
            rate = session.rates.rate(),
            "Session started"
        );
        Ok(session)
    }

    pub fn config(&self) -> &SubtrackConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn rates(&self) -> &ExchangeRateService {
        &self.rates
    }

    pub fn data(&self) -> &DataAccess {
        &self.data
    }

    /// Aggregate `records` at the current rate, falling back to the default.
    pub fn summary(&self, records: &[SubscriptionRecord]) -> AggregateResult {
        aggregate(records, self.rates.rate(), self.rates.default_rate())
    }

    /// Cancel every timer, in-flight request and listener.
    pub fn shutdown(&self) {
        self.rates.shutdown();
        self.data.shutdown();
        self.connectivity.dispose();
        tracing::info!("Session shut down");
    }
}

impl Drop for CoreSession {
    fn drop(&mut self) {
        if !self.rates.is_shut_down() {
            self.shutdown();
        }
    }
}
