//! Application services for the demo site.

pub mod blog;
pub mod error;
