use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{Error, Result};

/// One face embedding.
pub type FeatureVector = Array1<f32>;

/// Embeddings stacked one row per sample, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Array2<f32>,
}

impl FeatureMatrix {
    /// Stack `vectors` into a matrix without reordering or normalizing them.
    pub fn aggregate(vectors: Vec<FeatureVector>) -> Result<Self> {
        let dim = match vectors.first() {
            Some(v) => v.len(),
            None => return Err(Error::EmptyBatch),
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::ShapeMismatch {
                expected: vec![dim],
                found: vec![bad.len()],
            });
        }

        let n = vectors.len();
        let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
        let found = flat.len();
        let rows = Array2::from_shape_vec((n, dim), flat).map_err(|_| Error::ShapeMismatch {
            expected: vec![n, dim],
            found: vec![found],
        })?;
        Ok(Self { rows })
    }

    /// `(samples, dimension)`
    pub fn shape(&self) -> (usize, usize) {
        self.rows.dim()
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.rows.view()
    }
}

impl TryFrom<Array2<f32>> for FeatureMatrix {
    type Error = Error;

    fn try_from(rows: Array2<f32>) -> Result<Self> {
        if rows.nrows() == 0 {
            return Err(Error::EmptyBatch);
        }
        Ok(Self { rows })
    }
}
