//! Incremental document sync and vector search over a remote folder.
//!
//! Remote files are listed, diffed against the persisted index, extracted,
//! chunked and embedded; queries run against an in-memory nearest-neighbor
//! structure rebuilt from the stored vectors.

pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod service;
