//! Host-side registration: which worker version is active, which one is
//! waiting, and which page clients are controlled.

use std::collections::BTreeMap;
use std::sync::Arc;

use piggybank_client::Fetcher;
use piggybank_core::{CacheStorage, Error, Request, Response};

use crate::config::WorkerConfig;
use crate::worker::{ActivateReport, FetchDecision, InstallReport, OfflineWorker};

/// An open page (tab) of the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// What happened to a newly registered worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Installed and took over as the active worker.
    Activated(ActivateReport),
    /// Installed; waits until no client is controlled by the active worker.
    Waiting(InstallReport),
}

pub struct Registration {
    storage: CacheStorage,
    network: Arc<dyn Fetcher>,
    active: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
    /// Open clients and whether each is controlled by the active worker.
    clients: BTreeMap<ClientId, bool>,
    next_client: u64,
}

impl Registration {
    pub fn new(storage: CacheStorage, network: Arc<dyn Fetcher>) -> Self {
        Self { storage, network, active: None, waiting: None, clients: BTreeMap::new(), next_client: 1 }
    }

    pub fn active(&self) -> Option<&Arc<OfflineWorker>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<OfflineWorker>> {
        self.waiting.as_ref()
    }

    pub fn is_controlled(&self, client: ClientId) -> bool {
        self.clients.get(&client).copied().unwrap_or(false)
    }

    pub fn controlled_count(&self) -> usize {
        self.clients.values().filter(|c| **c).count()
    }

    /// Install a new worker version and activate it when the host allows.
    ///
    /// The first worker, or one that asks to skip waiting, activates at once.
    /// Otherwise it waits for every controlled client to close. A failed
    /// install leaves the current active worker in place.
    ///
    /// # Errors
    ///
    /// Propagates the new worker's install error, typically
    /// `Error::InstallFailed`.
    pub async fn register(&mut self, config: WorkerConfig) -> Result<RegisterOutcome, Error> {
        let worker = Arc::new(OfflineWorker::new(config, self.storage.clone(), self.network.clone()));
        let installed = worker.install().await?;

        if let Some(replaced) = self.waiting.take() {
            replaced.mark_redundant();
        }

        let controlled = self.controlled_count();
        if self.active.is_none() || installed.skip_waiting || controlled == 0 {
            let report = self.promote(worker).await?;
            return Ok(RegisterOutcome::Activated(report));
        }

        tracing::info!(worker = %worker.id(), store = %worker.store_name(), controlled, "worker waiting for clients to close");
        self.waiting = Some(worker);
        Ok(RegisterOutcome::Waiting(installed))
    }

    async fn promote(&mut self, worker: Arc<OfflineWorker>) -> Result<ActivateReport, Error> {
        let report = worker.activate().await?;

        if let Some(previous) = self.active.replace(worker) {
            previous.mark_redundant();
        }

        if report.claim_clients {
            for controlled in self.clients.values_mut() {
                *controlled = true;
            }
            tracing::debug!(clients = self.clients.len(), "claimed open clients");
        }

        Ok(report)
    }

    /// Open a blank page. It is not controlled until it navigates or is claimed.
    pub fn open_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.clients.insert(id, false);
        id
    }

    /// Close a page. A waiting worker takes over once no client is controlled.
    pub async fn close_client(&mut self, client: ClientId) -> Result<(), Error> {
        self.clients
            .remove(&client)
            .ok_or_else(|| Error::InvalidInput(format!("unknown client {client}")))?;

        if self.controlled_count() > 0 {
            return Ok(());
        }
        if let Some(worker) = self.waiting.take() {
            self.promote(worker).await?;
        }
        Ok(())
    }

    /// Load a document in `client`; the page comes under the active worker's control.
    pub async fn navigate(&mut self, client: ClientId, request: &Request) -> Result<Response, Error> {
        if !request.is_navigation() {
            return Err(Error::InvalidInput(format!("{} is not a navigation request", request.url)));
        }

        let has_active = self.active.is_some();
        let controlled = self
            .clients
            .get_mut(&client)
            .ok_or_else(|| Error::InvalidInput(format!("unknown client {client}")))?;
        *controlled = has_active;

        self.fetch(client, request).await
    }

    /// Issue a request from `client`.
    ///
    /// Requests from uncontrolled clients, and requests the worker passes
    /// through, go straight to the network.
    pub async fn fetch(&self, client: ClientId, request: &Request) -> Result<Response, Error> {
        let controlled = *self
            .clients
            .get(&client)
            .ok_or_else(|| Error::InvalidInput(format!("unknown client {client}")))?;

        let worker = match &self.active {
            Some(worker) if controlled => worker,
            _ => return self.network.fetch(request).await,
        };

        match worker.handle_fetch(request).await? {
            FetchDecision::Respond(response) => Ok(response),
            FetchDecision::Passthrough => self.network.fetch(request).await,
        }
    }

    /// Wait for the active worker's background cache writes.
    pub async fn flush_writes(&self) {
        if let Some(worker) = &self.active {
            worker.flush_writes().await;
        }
    }
}
