//! Offline request-caching worker for the piggybank web client.
//!
//! The worker pre-caches a manifest of static assets on install, prunes
//! stores left behind by older versions on activation, and then answers
//! every page request:
//!
//! - API calls pass straight through to the network
//! - page navigations go network-first, falling back to the last good document
//! - everything else goes cache-first, filling the cache from same-origin 2xx responses
//!
//! [`Registration`] plays the part of the browser host: it decides when an
//! installed worker may take over and which page clients it controls.

pub mod config;
pub mod registration;
pub mod routing;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{WorkerConfig, WorkerPolicy};
pub use registration::{ClientId, RegisterOutcome, Registration};
pub use routing::Route;
pub use worker::{ActivateReport, FetchDecision, InstallReport, OfflineWorker, WorkerId, WorkerState};
