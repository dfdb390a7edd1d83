//! The offline worker: install, activate, then intercept fetches.
//!
//! ```text
//! Parsed ──install──▶ Installing ──▶ Installed ──activate──▶ Activating ──▶ Activated
//!                         │
//!                         └── manifest fetch failed ──▶ Redundant
//! ```
//!
//! A worker that is replaced by a newer version also ends up `Redundant`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use piggybank_client::Fetcher;
use piggybank_core::{CacheMode, CacheStorage, Error, Request, RequestMode, Response, Snapshot};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use url::Origin;

use crate::config::{WorkerConfig, WorkerPolicy};
use crate::routing::{self, Route};

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to be activated.
    Installed,
    Activating,
    /// Serving fetches.
    Activated,
    /// Installation failed or a newer version took over.
    Redundant,
}

/// Result of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub store_name: String,
    /// Number of manifest entries written.
    pub assets: usize,
    /// The worker asks the host not to wait for old clients to close.
    pub skip_waiting: bool,
}

/// Result of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stores deleted because they belonged to other versions.
    pub pruned: Vec<String>,
    /// The worker asks the host to take control of already-open clients.
    pub claim_clients: bool,
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Not handled here; perform the request natively.
    Passthrough,
    /// Deliver this response to the page.
    Respond(Response),
}

/// One version of the offline worker.
pub struct OfflineWorker {
    id: WorkerId,
    config: WorkerConfig,
    origin: Origin,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    state: watch::Sender<WorkerState>,
    writes: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("store", &self.config.store_name())
            .field("state", &self.state())
            .finish()
    }
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        let origin = config.origin();
        Self {
            id: WorkerId::next(),
            config,
            origin,
            storage,
            fetcher,
            state: watch::Sender::new(WorkerState::Parsed),
            writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn policy(&self) -> WorkerPolicy {
        self.config.policy()
    }

    pub fn store_name(&self) -> &str {
        self.config.store_name()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Move from `from` to `to`, or fail without changing anything.
    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut actual = from;
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                actual = *state;
                false
            }
        });

        if !changed {
            return Err(Error::InvalidState(format!(
                "{} cannot move to {to:?} from {actual:?} (expected {from:?})",
                self.id
            )));
        }

        tracing::info!(worker = %self.id, store = %self.store_name(), ?from, ?to, "worker state changed");
        Ok(())
    }

    pub(crate) fn mark_redundant(&self) {
        let previous = self.state.send_replace(WorkerState::Redundant);
        if previous != WorkerState::Redundant {
            tracing::info!(worker = %self.id, store = %self.store_name(), from = ?previous, "worker is redundant");
        }
    }

    /// Run the installation phase.
    ///
    /// Opens this version's store and fills it with every manifest entry.
    /// Either all entries are written or none are; on failure the worker
    /// becomes `Redundant`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` naming the first asset that could not
    /// be fetched or came back non-2xx, `Error::Database` if the store write
    /// fails, and `Error::InvalidState` if the worker was already installed.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;

        match self.precache().await {
            Ok(assets) => {
                self.transition(WorkerState::Installing, WorkerState::Installed)?;
                Ok(InstallReport {
                    store_name: self.store_name().to_string(),
                    assets,
                    skip_waiting: self.policy().fast_activation,
                })
            }
            Err(err) => {
                tracing::warn!(worker = %self.id, store = %self.store_name(), error = %err, "install failed");
                self.mark_redundant();
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let store = self.storage.open_store(self.store_name()).await?;

        let mut snapshots = Vec::with_capacity(self.config.manifest().len());
        for url in self.config.manifest() {
            let request = Request::get(url.clone()).with_mode(RequestMode::SameOrigin);
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed { asset: url.path().to_string(), reason: e.to_string() })?;

            if !response.is_ok() {
                return Err(Error::InstallFailed {
                    asset: url.path().to_string(),
                    reason: format!("status {}", response.status),
                });
            }

            snapshots.push(Snapshot::capture(request.identity(), &response));
        }

        let count = snapshots.len();
        store.put_all(snapshots).await?;
        tracing::debug!(store = %self.store_name(), assets = count, "precached manifest");
        Ok(count)
    }

    /// Run the activation phase.
    ///
    /// Deletes every store that does not belong to this version. Pruning
    /// failures are logged and left for the next activation.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is `Installed`.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        let pruned = match self.storage.retain(self.store_name()).await {
            Ok(pruned) => pruned,
            Err(err) => {
                tracing::warn!(worker = %self.id, error = %err, "failed to prune old stores");
                Vec::new()
            }
        };

        self.transition(WorkerState::Activating, WorkerState::Activated)?;

        Ok(ActivateReport { pruned, claim_clients: self.policy().fast_activation })
    }

    /// Handle one request from a controlled page.
    ///
    /// `Err` means the page sees a failed load; it is only returned for
    /// sub-resource requests that miss the cache and cannot reach the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchDecision, Error> {
        let state = self.state();
        if state != WorkerState::Activated {
            return Err(Error::InvalidState(format!("{} cannot handle fetches while {state:?}", self.id)));
        }

        match routing::classify(request, &self.origin, self.config.api_prefix()) {
            Route::Bypass => {
                tracing::debug!(url = %request.url, "bypassing API request");
                Ok(FetchDecision::Passthrough)
            }
            Route::Navigation => Ok(FetchDecision::Respond(self.network_first(request).await)),
            Route::CacheFirst => self.cache_first(request).await.map(FetchDecision::Respond),
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        let refresh = self.policy().navigation_cache_refresh;
        let live = if refresh { request.clone().with_cache(CacheMode::NoStore) } else { request.clone() };

        match self.fetcher.fetch(&live).await {
            Ok(response) => {
                if refresh {
                    self.write_behind(self.config.document().to_string(), response.clone()).await;
                }
                response
            }
            Err(err) => {
                let document = self.config.document().as_str();
                match self.lookup(document).await {
                    Some(cached) => {
                        tracing::debug!(url = %request.url, error = %err, "navigation offline; serving stored document");
                        cached
                    }
                    None => {
                        tracing::warn!(url = %request.url, error = %err, "navigation offline and no stored document");
                        Response::error()
                    }
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Response, Error> {
        // Only GET responses are ever stored.
        if !request.method.eq_ignore_ascii_case("GET") {
            return self.fetcher.fetch(request).await;
        }

        let key = request.identity();
        if let Some(cached) = self.lookup(&key).await {
            tracing::debug!(key = %key, "cache hit");
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_ok() && request.is_same_origin(&self.origin) {
            self.write_behind(key, response.clone()).await;
        } else {
            tracing::debug!(key = %key, status = response.status, "not caching response");
        }
        Ok(response)
    }

    /// Read from this version's store. Store failures count as a miss.
    async fn lookup(&self, key: &str) -> Option<Response> {
        let snapshot = match self.storage.match_in(self.store_name(), key).await {
            Ok(snapshot) => snapshot?,
            Err(err) => {
                tracing::warn!(store = %self.store_name(), key = %key, error = %err, "cache read failed");
                return None;
            }
        };

        match snapshot.into_response() {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(store = %self.store_name(), key = %key, error = %err, "discarding unreadable entry");
                if let Err(err) = self.storage.delete_entry(self.store_name(), key).await {
                    tracing::warn!(store = %self.store_name(), key = %key, error = %err, "failed to discard entry");
                }
                None
            }
        }
    }

    /// Store a copy of `response` without delaying delivery to the page.
    async fn write_behind(&self, key: String, response: Response) {
        let storage = self.storage.clone();
        let store_name = self.store_name().to_string();

        let mut writes = self.writes.lock().await;
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            let snapshot = Snapshot::capture(key, &response);
            if let Err(err) = storage.put_entry(&store_name, &snapshot).await {
                tracing::warn!(store = %store_name, key = %snapshot.key, error = %err, "cache write failed");
            }
        });
    }

    /// Wait for every background cache write started so far.
    pub async fn flush_writes(&self) {
        let mut pending = std::mem::take(&mut *self.writes.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(err) = result {
                tracing::warn!(worker = %self.id, error = %err, "cache write task aborted");
            }
        }
    }
}
