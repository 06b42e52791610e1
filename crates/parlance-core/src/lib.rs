//! Session store logic and repository trait definitions for Parlance.
//!
//! This crate defines the "port" (the [`chat::repository::ChatStore`]
//! trait) that the infrastructure layer implements, plus the in-memory
//! components composed into the chat session service: the sliding-window
//! rate limiter, the two-tier session cache, and the history search
//! engine. It depends only on `parlance-types` -- never on
//! `parlance-infra` or any database crate.

pub mod chat;
pub mod limiter;
pub mod search;
