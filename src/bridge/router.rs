//! Bridge router
//!
//! A single background task that moves finished records from the inbound
//! queue into the results map, in publish order. It never exits on an empty
//! queue; it runs until the owner aborts it.

use crate::bridge::exchange::SharedExchange;
use crate::core::errors::{MuxDemuxError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Running,
    Stopped,
}

/// Owner of the running router task
#[derive(Debug)]
pub struct RouterHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl RouterHandle {
    /// Spawn the router onto the current tokio runtime
    pub fn spawn<T: Send + Sync + 'static>(
        name: impl Into<String>,
        exchange: Arc<SharedExchange<T>>,
    ) -> Self {
        let name = name.into();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            route(&task_name, &exchange).await;
        });
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RouterState {
        match &self.handle {
            Some(handle) if !handle.is_finished() => RouterState::Running,
            _ => RouterState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RouterState::Running
    }

    /// Abort the router and wait for the task to go away.
    ///
    /// Records still in the inbound queue stay there. A router that had
    /// panicked is reported as `Internal`.
    pub async fn stop(&mut self) -> Result<RouterState> {
        let Some(handle) = self.handle.take() else {
            return Ok(RouterState::Stopped);
        };

        handle.abort();
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!(router = %self.name, error = %e, "Router task panicked");
                return Err(MuxDemuxError::internal_with_source(
                    format!("router '{}' panicked", self.name),
                    e,
                ));
            }
        }

        info!(router = %self.name, "Router stopped");
        Ok(RouterState::Stopped)
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn route<T: Send + Sync + 'static>(name: &str, exchange: &SharedExchange<T>) {
    info!(router = %name, "Router started");
    loop {
        match exchange.take_inbound().await {
            Ok(record) => exchange.store_result(record),
            Err(e) => {
                // Only reachable once the queue has been torn down
                warn!(router = %name, error = %e, "Inbound queue gone, router exiting");
                break;
            }
        }
    }
}
