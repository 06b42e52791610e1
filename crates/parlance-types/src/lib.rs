//! Shared domain types for Parlance.
//!
//! This crate contains the domain types used across the Parlance chat
//! session store: identities, sessions, messages, search results, rate
//! limit classes, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod limit;
pub mod search;
