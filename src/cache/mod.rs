//! Cache module for storing CEP Aberto responses on disk
//!
//! One file per postal code holding the raw response body. Presence of a
//! parsable file means the code is resolved; entries never expire, so an
//! interrupted batch resumes where it stopped.

mod manager;

pub use manager::CacheManager;
