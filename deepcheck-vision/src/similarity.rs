use ndarray::ArrayView1;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::features::FeatureMatrix;

/// Mean cosine similarity below which a pair is flagged.
pub const DEEPFAKE_THRESHOLD: f32 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub cosine: f32,
    pub euclidean: f32,
    pub is_likely_deepfake: bool,
}

/// Compare two matrices row by row.
///
/// Row `i` of `a` is paired with row `i` of `b`; both sides are sampled with
/// the same frame count, so no alignment or resampling happens here.
pub fn compare(a: &FeatureMatrix, b: &FeatureMatrix) -> Result<SimilarityResult> {
    if a.shape() != b.shape() {
        let (ra, ca) = a.shape();
        let (rb, cb) = b.shape();
        return Err(Error::ShapeMismatch {
            expected: vec![ra, ca],
            found: vec![rb, cb],
        });
    }

    let cosine = mean_cosine(a, b);
    Ok(SimilarityResult {
        cosine,
        euclidean: euclidean_distance(a, b),
        is_likely_deepfake: is_likely_deepfake(cosine),
    })
}

pub fn is_likely_deepfake(cosine: f32) -> bool {
    cosine < DEEPFAKE_THRESHOLD
}

/// Cosine similarity, or `None` when either vector has zero norm.
pub fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Option<f32> {
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(a.dot(&b) / norm)
}

/// Mean of the row-wise cosine similarities.
///
/// Rows with a zero-norm embedding are left out of the mean; when every row is
/// degenerate the score is 0.
pub fn mean_cosine(a: &FeatureMatrix, b: &FeatureMatrix) -> f32 {
    let (a, b) = (a.view(), b.view());
    let (sum, count) = a
        .rows()
        .into_iter()
        .zip(b.rows())
        .filter_map(|(x, y)| cosine(x, y))
        .fold((0.0f64, 0usize), |(s, n), c| (s + c as f64, n + 1));

    if count < a.nrows() {
        log::warn!(
            "{} of {} rows had a zero-norm embedding and were skipped",
            a.nrows() - count,
            a.nrows()
        );
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64) as f32
}

/// L2 norm of `a - b` taken over the whole flattened matrix.
pub fn euclidean_distance(a: &FeatureMatrix, b: &FeatureMatrix) -> f32 {
    let diff = &a.view() - &b.view();
    diff.iter()
        .map(|d| (*d as f64).powi(2))
        .sum::<f64>()
        .sqrt() as f32
}
