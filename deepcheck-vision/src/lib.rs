pub mod error;
pub mod face;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod similarity;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use error::{Error, Result};
pub use face::Detection;
pub use features::{FeatureMatrix, FeatureVector};
pub use pipeline::{EmbeddingExtractor, FacePolicy, FacePreprocessor, Pipeline, PipelineOptions};
pub use similarity::{compare, SimilarityResult, DEEPFAKE_THRESHOLD};
pub use video::{FfmpegVideo, Frame, FrameSource};
