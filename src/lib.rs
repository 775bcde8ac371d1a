//! cepgeo library
//!
//! Exposes the cache, geocoding client, and batch I/O modules for the binary
//! and for integration tests.

pub mod cache;
pub mod cli;
pub mod geocode;
pub mod input;
pub mod output;
