//! HashKV Core: field store and durability log for a Redis-like server
//!
//! An in-memory key-value engine holding strings, lists and multi-field
//! hashes, made crash-recoverable by an append-only log of RESP commands.
//!
//! # Architecture
//!
//! - **Field store**: two-choice (cuckoo-style) hash table for hash records,
//!   one table-wide RwLock
//! - **AOF**: every mutating command appended in wire form, synced to disk
//!   in the background, replayed on open
//! - **Engine**: parses requests, logs writes, applies them to the stores
//!
//! The network server lives in the separate `hashkv-server` crate.

pub mod aof;
pub mod command;
pub mod config;
pub mod durability;
pub mod engine;
pub mod error;
pub mod field_store;
pub mod lists;
pub mod resp;
pub mod strings;

// Re-export key types for convenience
pub use aof::Aof;
pub use command::Command;
pub use config::Config;
pub use engine::Engine;
pub use error::{KvError, KvResult};
pub use field_store::{FieldStore, Record};
pub use lists::ListStore;
pub use resp::{RespReader, Value};
pub use strings::{CounterError, StringStore};
