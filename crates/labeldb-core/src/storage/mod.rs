//! Storage layer for LabelDB.
//!
//! This module provides a sled-based row store with transactional write
//! overlays, row id sequences, and index entry encoding.

mod config;
mod engine;
mod record;
mod transaction;

pub mod key;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use record::Record;
pub use transaction::Transaction;
