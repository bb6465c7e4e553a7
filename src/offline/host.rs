// Worker registration and controller handover
// Author: kelexine (https://github.com/kelexine)

use super::clients::WorkerMessage;
use super::network::{FetchRequest, FetchResponse, Network};
use super::worker::{MessageOutcome, OfflineWorker};
use super::Platform;
use crate::config::OfflineConfig;
use crate::error::{GateError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Holds the worker controlling the clients and, at most, one waiting
/// behind it.
pub struct WorkerHost<N> {
    config: OfflineConfig,
    network: N,
    platform: Platform,
    controller: RwLock<Option<Arc<OfflineWorker<N>>>>,
    waiting: RwLock<Option<Arc<OfflineWorker<N>>>>,
}

impl<N: Network + Clone> WorkerHost<N> {
    pub fn new(config: &OfflineConfig, network: N) -> Self {
        Self {
            config: config.clone(),
            platform: Platform::new(config),
            network,
            controller: RwLock::new(None),
            waiting: RwLock::new(None),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn controller(&self) -> Option<Arc<OfflineWorker<N>>> {
        self.controller.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<OfflineWorker<N>>> {
        self.waiting.read().clone()
    }

    /// Install a worker for `cache_name`. It takes control right away when
    /// nothing controls the clients yet or it asked to skip waiting;
    /// otherwise it replaces whatever was waiting.
    pub async fn register(&self, cache_name: &str) -> Result<Arc<OfflineWorker<N>>> {
        let config = OfflineConfig {
            cache_name: cache_name.to_string(),
            ..self.config.clone()
        };
        let worker = Arc::new(OfflineWorker::new(
            &config,
            self.network.clone(),
            self.platform.clone(),
        ));

        info!("Registering worker for cache generation {}", cache_name);
        worker.install().await?;

        if self.controller().is_none() || worker.wants_skip_waiting() {
            self.promote(worker.clone())?;
        } else {
            debug!("Worker {} is waiting", cache_name);
            if let Some(previous) = self.waiting.write().replace(worker.clone()) {
                previous.mark_redundant();
            }
        }

        Ok(worker)
    }

    /// Promote the waiting worker, if any.
    pub fn skip_waiting(&self) -> Result<Option<Arc<OfflineWorker<N>>>> {
        let Some(worker) = self.waiting.write().take() else {
            return Ok(None);
        };
        worker.skip_waiting();
        self.promote(worker.clone())?;
        Ok(Some(worker))
    }

    fn promote(&self, worker: Arc<OfflineWorker<N>>) -> Result<()> {
        worker.activate()?;
        let previous = self.controller.write().replace(worker.clone());
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &worker) {
                previous.mark_redundant();
            }
        }
        info!("Worker {} now controls clients", worker.cache_name());
        Ok(())
    }

    /// Deliver a page message to the waiting worker, else the controller.
    pub fn post_message(&self, message: WorkerMessage) -> Result<MessageOutcome> {
        let waiting = self.waiting();
        let target = waiting
            .clone()
            .or_else(|| self.controller())
            .ok_or(GateError::NoController)?;

        let outcome = target.on_message(message);
        if outcome == MessageOutcome::SkipWaitingRequested && waiting.is_some() {
            self.skip_waiting()?;
        }
        Ok(outcome)
    }

    /// Fetch through the controller, or straight from the network when
    /// nothing controls the clients.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        match self.controller() {
            Some(worker) => worker.handle_fetch(request).await,
            None => self
                .network
                .fetch(&request)
                .await
                .map_err(|e| GateError::Upstream(e.to_string())),
        }
    }
}
