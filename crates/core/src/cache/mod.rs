//! SQLite-backed store of named cache instances.
//!
//! This module provides a persistent request→response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Version-named instances that can be swept as a whole
//! - Entries keyed by request identity (method + absolute URL)
//! - Insertion-ordered enumeration and size-bounded eviction
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod evict;
pub mod hash;
pub mod instances;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheInstance, EntryMeta};
pub use evict::EvictionReport;
