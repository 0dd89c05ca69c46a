//! Post-processing of rendered markup before it is stored.

mod loader;
mod transform;

pub use transform::{
    TransformError, is_canonical_link, is_data_script, is_deferred_loader, transform,
    try_transform,
};
