//! Network access for piggybank-sw.
//!
//! This crate provides the `Fetcher` seam the worker uses to reach the
//! network, its reqwest implementation, and URL helpers shared by the
//! worker and its host driver.

pub mod fetch;

pub use fetch::{FetchConfig, Fetcher, HttpFetcher, UrlError, canonicalize, resolve_path};
