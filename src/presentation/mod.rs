//! Server-rendered views for the demo site.

pub mod views;
