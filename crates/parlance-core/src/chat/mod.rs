//! Chat session persistence and service composition.
//!
//! `repository` defines the durable-store port, `cache` the write-through
//! in-memory tier, and `service` the public entry points gluing admission
//! control, cache, store, and search together.

pub mod cache;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod test_store;
