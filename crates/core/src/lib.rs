//! Core types and shared functionality for seamcache.
//!
//! This crate provides:
//! - The cache store (named instances over SQLite) and its evictor
//! - The request/response model and the `Network` seam
//! - The install manifest
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;

pub use cache::{CacheDb, CacheInstance, EntryMeta, EvictionReport};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use manifest::Manifest;
pub use model::{Destination, Network, Request, Response};
