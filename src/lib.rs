//! Response cache for server-rendered pages.
//!
//! Requests are split into crawler and browser traffic, each with its own
//! freshness policy and its own cache partition. Misses are rendered once,
//! post-processed for the caller class and written through to a shared store.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod presentation;
pub mod render;
pub mod util;
