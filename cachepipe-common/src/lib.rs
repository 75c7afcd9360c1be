// cachepipe-common - Shared types, errors, and configuration for CachePipe
//
// This crate defines the result families, tagged store values, and the error
// taxonomy shared by the pipeline client and its collaborators.

pub mod config;
pub mod error;
pub mod types;

// Re-export for convenience
pub use config::*;
pub use error::*;
pub use types::*;
