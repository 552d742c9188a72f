//! YuNet detector output decoding.
//!
//! The network emits four heads per stride (8, 16, 32), each flattened over
//! the `(input / stride)²` grid:
//! - cls `[1, N, 1]` and obj `[1, N, 1]`, combined as `sqrt(cls * obj)`
//! - bbox `[1, N, 4]`: `(dx, dy, log w, log h)` in stride units
//! - kps `[1, N, 10]`: five landmark offsets in stride units
//!
//! Tensor order is all cls, then all obj, then all bbox, then all kps.

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};

pub const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points, normalized [0,1]
}

/// Decoded heads for one stride.
#[derive(Debug, Clone)]
pub struct StrideHead {
    pub stride: usize,
    pub scores: Array2<f32>,
    pub boxes: Array2<f32>,
    pub landmarks: Array2<f32>,
}

fn head_view<'a>(
    outputs: &[(&[i64], &'a [f32])],
    at: usize,
    rows: usize,
    cols: usize,
) -> Result<ArrayView2<'a, f32>> {
    let (shape, data) = *outputs
        .get(at)
        .ok_or_else(|| Error::Model(format!("missing detector output #{at}")))?;

    if shape != [1, rows as i64, cols as i64] {
        return Err(Error::Model(format!(
            "detector output #{at} has shape {shape:?}, expected [1, {rows}, {cols}]"
        )));
    }
    ArrayView2::from_shape((rows, cols), data).map_err(|e| Error::Model(e.to_string()))
}

/// Group the twelve raw detector tensors into per-stride heads.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<StrideHead>> {
    let n = STRIDES.len();
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let cells = (input_size / stride).pow(2);
            let cls = head_view(outputs, i, cells, 1)?;
            let obj = head_view(outputs, n + i, cells, 1)?;
            let boxes = head_view(outputs, 2 * n + i, cells, 4)?;
            let landmarks = head_view(outputs, 3 * n + i, cells, 10)?;

            let mut scores = cls.to_owned();
            scores.zip_mut_with(&obj, |c, &o| *c = (c.clamp(0.0, 1.0) * o.clamp(0.0, 1.0)).sqrt());

            Ok(StrideHead {
                stride,
                scores,
                boxes: boxes.to_owned(),
                landmarks: landmarks.to_owned(),
            })
        })
        .collect()
}

/// Decode grid cells scoring at least `score_threshold` into normalized detections.
pub fn decode(heads: &[StrideHead], score_threshold: f32, input_size: usize) -> Vec<RawDetection> {
    let size = input_size as f32;
    let mut detections = Vec::new();

    for head in heads {
        let cols = input_size / head.stride;
        let stride = head.stride as f32;

        for (idx, &score) in head.scores.column(0).iter().enumerate() {
            if score < score_threshold {
                continue;
            }
            let gx = (idx % cols) as f32;
            let gy = (idx / cols) as f32;
            let b = head.boxes.row(idx);

            let cx = (gx + b[0]) * stride;
            let cy = (gy + b[1]) * stride;
            let w = b[2].exp() * stride;
            let h = b[3].exp() * stride;

            let kps = head.landmarks.row(idx);
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = (gx + kps[k * 2]) * stride / size;
                landmarks[k * 2 + 1] = (gy + kps[k * 2 + 1]) * stride / size;
            }

            detections.push(RawDetection {
                bbox: [
                    (cx - w / 2.0) / size,
                    (cy - h / 2.0) / size,
                    w / size,
                    h / size,
                ],
                score,
                landmarks,
            });
        }
    }

    detections
}
