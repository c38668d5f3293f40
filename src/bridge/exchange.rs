//! Shared exchange between submitters, workers and the bridge router
//!
//! Submitters `submit` into the outbound queue and later poll `is_pending`
//! and `take_result`. Workers `take_outbound`, process, and `publish` the
//! result under the same identifier. The router is the only reader of the
//! inbound queue and the only writer of the results map.

use crate::bridge::provider::{SharedMap, SharedQueue};
use crate::bridge::record::CorrelationRecord;
use crate::core::config::MuxDemuxConfig;
use crate::core::errors::{MuxDemuxError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

/// Snapshot of exchange counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub submitted: u64,
    pub taken_by_workers: u64,
    pub published: u64,
    pub routed: u64,
    pub retrieved: u64,
    /// Results stored but not yet taken, including ones nobody will claim
    pub results_held: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    taken_by_workers: AtomicU64,
    published: AtomicU64,
    routed: AtomicU64,
    retrieved: AtomicU64,
}

/// Outbound queue, inbound queue and results map bundled together
pub struct SharedExchange<T = Value> {
    outbound: SharedQueue<CorrelationRecord<T>>,
    inbound: SharedQueue<CorrelationRecord<T>>,
    results: SharedMap<T>,
    config: MuxDemuxConfig,
    counters: Counters,
}

impl<T: Send + Sync + 'static> SharedExchange<T> {
    pub fn new(
        outbound: SharedQueue<CorrelationRecord<T>>,
        inbound: SharedQueue<CorrelationRecord<T>>,
        results: SharedMap<T>,
        config: MuxDemuxConfig,
    ) -> Self {
        Self {
            outbound,
            inbound,
            results,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &MuxDemuxConfig {
        &self.config
    }

    /// Queue a request for the workers.
    ///
    /// Never blocks. The identifier must not already be in flight; that is
    /// not checked here.
    pub fn submit(&self, identifier: impl Into<String>, payload: T) -> Result<()> {
        let record = CorrelationRecord::new(identifier, payload);
        debug!(identifier = %record.identifier(), "Submitting to outbound");
        self.outbound.push(record)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Next outbound record, waiting until one is available.
    ///
    /// Safe to call from many workers at once; each record goes to one of them.
    pub async fn take_outbound(&self) -> Result<CorrelationRecord<T>> {
        let record = self.outbound.pop().await?;
        self.counters.taken_by_workers.fetch_add(1, Ordering::Relaxed);
        debug!(identifier = %record.identifier(), "Worker took outbound record");
        Ok(record)
    }

    /// Next outbound record if one is ready
    pub fn try_take_outbound(&self) -> Option<CorrelationRecord<T>> {
        let record = self.outbound.try_pop()?;
        self.counters.taken_by_workers.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// Hand a finished record back. The identifier must match the submission.
    pub fn publish(&self, record: CorrelationRecord<T>) -> Result<()> {
        debug!(identifier = %record.identifier(), "Publishing to inbound");
        self.inbound.push(record)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// True while no result is stored for `identifier`.
    ///
    /// A single check is not authoritative: the router may store the result
    /// right after this returns `true`.
    pub fn is_pending(&self, identifier: &str) -> bool {
        !self.results.contains(identifier)
    }

    /// Remove and return the stored result for `identifier`.
    ///
    /// Fails with `ResultNotFound` if nothing is stored; guard with
    /// `is_pending` or use `wait_result`.
    pub fn take_result(&self, identifier: &str) -> Result<T> {
        match self.results.remove(identifier) {
            Some(payload) => {
                self.counters.retrieved.fetch_add(1, Ordering::Relaxed);
                debug!(identifier = %identifier, "Result retrieved");
                Ok(payload)
            }
            None => {
                warn!(identifier = %identifier, "Result taken before it was stored");
                Err(MuxDemuxError::result_not_found(identifier))
            }
        }
    }

    /// Poll until the result for `identifier` is stored, then take it.
    ///
    /// Polls every `poll_interval_ms`. Gives up with `Timeout` after
    /// `result_timeout_ms` if one is configured.
    pub async fn wait_result(&self, identifier: &str) -> Result<T> {
        let ready = async {
            let mut ticker = interval(self.config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while self.is_pending(identifier) {
                ticker.tick().await;
            }
        };

        match self.config.result_timeout_ms {
            Some(timeout_ms) => timeout(Duration::from_millis(timeout_ms), ready)
                .await
                .map_err(|_| {
                    MuxDemuxError::timeout(format!("wait_result({})", identifier), timeout_ms)
                })?,
            None => ready.await,
        }

        self.take_result(identifier)
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            taken_by_workers: self.counters.taken_by_workers.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            routed: self.counters.routed.load(Ordering::Relaxed),
            retrieved: self.counters.retrieved.load(Ordering::Relaxed),
            results_held: self.results.len(),
        }
    }

    /// Router only: next record from the inbound queue
    pub(crate) async fn take_inbound(&self) -> Result<CorrelationRecord<T>> {
        self.inbound.pop().await
    }

    /// Router only: store a finished record's payload under its identifier
    pub(crate) fn store_result(&self, record: CorrelationRecord<T>) {
        let (identifier, payload) = record.into_parts();
        if self.results.insert(identifier.clone(), payload).is_some() {
            warn!(identifier = %identifier, "Overwrote an unclaimed result");
        }
        self.counters.routed.fetch_add(1, Ordering::Relaxed);
        debug!(identifier = %identifier, "Result stored");
    }
}
