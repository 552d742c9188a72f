pub mod analyzer;
pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod scratch;
pub mod server;

// Re-export vision types for convenience
pub use deepcheck_vision::{self as vision, FeatureMatrix, SimilarityResult};
pub use error::DetectError;
