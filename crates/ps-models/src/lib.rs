//! # ps-models
//!
//! Collaborators consumed by the orchestration core: the sliding-window
//! input constructor, a handful of reference forecasters, and the
//! registration table that maps model names to implementations.

mod baseline;
mod linear;
mod registry;
mod windows;

pub use baseline::{LastValue, WindowAverage};
pub use linear::LinearAutoregression;
pub use registry::ModelRegistry;
pub use windows::WindowedInputs;
