//! Infrastructure implementations for Parlance.
//!
//! The SQLite-backed chat store with split read/write pools, plus the
//! `config.toml` loader. Implements the ports defined in `parlance-core`.

pub mod config;
pub mod sqlite;
