//! Core types and shared functionality for piggybank-sw.
//!
//! This crate provides:
//! - Plain request/response value types seen by the worker
//! - Versioned cache storage with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheStorage, Snapshot, Store};
pub use config::AppConfig;
pub use error::Error;
pub use http::{CacheMode, Request, RequestMode, Response, ResponseKind, request_identity};
