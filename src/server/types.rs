use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use deepcheck_vision::SimilarityResult;
use serde::{Deserialize, Serialize};

use crate::media::Upload;

/// `POST /detect` form. Both fields are optional here so that a missing
/// file is reported as a validation error rather than a bare rejection.
#[derive(TryFromMultipart)]
pub struct DetectRequest {
    #[form_data(field_name = "realMedia", limit = "unlimited")]
    pub real_media: Option<FieldData<Bytes>>,
    #[form_data(field_name = "fakeMedia", limit = "unlimited")]
    pub fake_media: Option<FieldData<Bytes>>,
}

pub fn to_upload(field: Option<FieldData<Bytes>>) -> Option<Upload> {
    field.map(|f| Upload {
        file_name: f.metadata.file_name,
        contents: f.contents.to_vec(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub message: String,
    pub cosine_similarity: f32,
    pub euclidean_similarity: f32,
    pub is_likely_deepfake: bool,
}

impl From<SimilarityResult> for DetectResponse {
    fn from(r: SimilarityResult) -> Self {
        Self {
            message: "Analysis completed successfully".to_string(),
            cosine_similarity: r.cosine,
            euclidean_similarity: r.euclidean,
            is_likely_deepfake: r.is_likely_deepfake,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
