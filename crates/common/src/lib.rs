pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use error::{PipelineError, Result};
pub use ids::*;
