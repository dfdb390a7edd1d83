//! SQLite-backed cache storage for captured responses.
//!
//! This module provides named, versioned response stores using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - One store per worker version, addressed by name
//! - Content-addressed entry keys using SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Whole-store deletion for version pruning

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod snapshots;
pub mod stores;

pub use crate::Error;

pub use connection::CacheStorage;
pub use snapshots::Snapshot;
pub use stores::Store;
