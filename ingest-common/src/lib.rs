//! # ingest-common
//!
//! Shared code for the ingestion pipeline daemon and its ancillary
//! schedulers:
//! - Error types
//! - Atomic JSON read/write (status record, fingerprint cache)
//! - Layered configuration resolution (CLI > env > TOML file > default)
//! - Calendar-date helpers for the cataloguer's literal-date query contract

pub mod atomic_io;
pub mod config;
pub mod dates;
pub mod error;

pub use error::{Error, Result};
