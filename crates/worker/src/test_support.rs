//! In-process network double for worker and registration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use piggybank_client::Fetcher;
use piggybank_core::{CacheStorage, Error, Request, Response, request_identity};
use url::Url;

use crate::config::{WorkerConfig, WorkerPolicy};
use crate::worker::OfflineWorker;

pub const ORIGIN: &str = "http://localhost:5173/";

/// Absolute paths resolve against [`ORIGIN`]; anything else must be a full URL.
pub fn url(s: &str) -> Url {
    if s.starts_with('/') { Url::parse(ORIGIN).unwrap().join(s).unwrap() } else { Url::parse(s).unwrap() }
}

/// Serves canned responses keyed by request identity.
///
/// Unknown URLs get a 404. While offline, or for URLs marked failing, the
/// fetch fails with `Error::Network`.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Request>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, target: &str, response: Response) {
        let key = request_identity(&url(target));
        self.failing.lock().unwrap().remove(&key);
        self.routes.lock().unwrap().insert(key, response);
    }

    pub fn serve_manifest(&self) {
        self.serve("/", Response::new(200, "<html>root</html>").with_header("content-type", "text/html"));
        self.serve(
            "/index.html",
            Response::new(200, "<html>piggybank</html>").with_header("content-type", "text/html"),
        );
        self.serve(
            "/manifest.json",
            Response::new(200, r#"{"name":"Piggybank"}"#).with_header("content-type", "application/json"),
        );
        self.serve("/icon-192.png", Response::new(200, "png-192").with_header("content-type", "image/png"));
        self.serve("/icon-512.png", Response::new(200, "png-512").with_header("content-type", "image/png"));
    }

    pub fn fail(&self, target: &str) {
        self.failing.lock().unwrap().insert(request_identity(&url(target)));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, target: &str) -> usize {
        let key = request_identity(&url(target));
        self.calls.lock().unwrap().iter().filter(|r| r.identity() == key).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// A fresh worker for [`ORIGIN`] using this fetcher as its network.
    pub fn worker(self: &Arc<Self>, storage: &CacheStorage, store_name: &str, policy: WorkerPolicy) -> OfflineWorker {
        let config = WorkerConfig::new(ORIGIN, store_name).unwrap().with_policy(policy);
        OfflineWorker::new(config, storage.clone(), self.clone())
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());
        let key = request.identity();

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {key}")));
        }
        if self.failing.lock().unwrap().contains(&key) {
            return Err(Error::Network(format!("connection reset: {key}")));
        }

        let response = self.routes.lock().unwrap().get(&key).cloned();
        Ok(response.unwrap_or_else(|| Response::new(404, "not found")))
    }
}
