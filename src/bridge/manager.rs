//! Lifecycle manager
//!
//! Owns the shared-state provider and the router so both share one lifetime:
//! `start` brings them up together, `shutdown` stops the router and then
//! tears the shared state down. `shutdown` consumes the manager, so a
//! stopped bridge cannot be used or shut down again.

use crate::bridge::exchange::SharedExchange;
use crate::bridge::provider::{StateProvider, TeardownReport};
use crate::bridge::router::{RouterHandle, RouterState};
use crate::core::config::MuxDemuxConfig;
use crate::core::errors::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const OUTBOUND_QUEUE: &str = "outbound";
pub const INBOUND_QUEUE: &str = "inbound";
pub const RESULTS_MAP: &str = "results";

pub struct MuxDemuxManager<T = Value> {
    provider: StateProvider,
    exchange: Arc<SharedExchange<T>>,
    router: RouterHandle,
}

impl<T: Send + Sync + 'static> MuxDemuxManager<T> {
    /// Create the shared state, build the exchange over it and start the
    /// router. Must be called from within a tokio runtime.
    pub fn start(config: MuxDemuxConfig) -> Result<Self> {
        config.validate()?;

        let provider = StateProvider::new();
        let results = provider.map(RESULTS_MAP)?;
        let outbound = provider.queue(OUTBOUND_QUEUE)?;
        let inbound = provider.queue(INBOUND_QUEUE)?;

        let router_name = config.router_name.clone();
        let exchange = Arc::new(SharedExchange::new(outbound, inbound, results, config));
        let router = RouterHandle::spawn(router_name.clone(), Arc::clone(&exchange));

        info!(router = %router_name, "Mux/demux bridge started");
        Ok(Self {
            provider,
            exchange,
            router,
        })
    }

    pub fn start_default() -> Result<Self> {
        Self::start(MuxDemuxConfig::default())
    }

    /// Handle for submitters and workers
    pub fn exchange(&self) -> Arc<SharedExchange<T>> {
        Arc::clone(&self.exchange)
    }

    pub fn config(&self) -> &MuxDemuxConfig {
        self.exchange.config()
    }

    pub fn router_state(&self) -> RouterState {
        self.router.state()
    }

    /// Stop the router, then tear down the shared state.
    ///
    /// Records still waiting in either queue and results nobody took are
    /// discarded and counted in the returned report. Exchange handles held
    /// elsewhere stay valid but every queue operation on them fails from
    /// here on.
    pub async fn shutdown(mut self) -> Result<TeardownReport> {
        let stopped = self.router.stop().await;
        let report = self.provider.shutdown();
        stopped?;

        info!(
            router = %self.router.name(),
            discarded = report.total(),
            "Mux/demux bridge shut down"
        );
        Ok(report)
    }
}
