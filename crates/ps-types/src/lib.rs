pub mod config;
pub mod criterion;
pub mod errors;
pub mod inputs;
pub mod model;
pub mod sweep;
pub mod task;

pub use config::*;
pub use criterion::*;
pub use errors::*;
pub use inputs::*;
pub use model::*;
pub use sweep::*;
pub use task::*;
