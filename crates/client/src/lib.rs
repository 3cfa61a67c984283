//! Client code for seamcache.
//!
//! This crate provides the upstream HTTP fetch the worker uses as its
//! network, and URL canonicalization for request identity.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, UrlError, canonicalize};
