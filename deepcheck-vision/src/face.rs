use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::yunet;

/// Side of the square canvas the detector runs on.
pub const DETECTOR_INPUT: u32 = 640;
/// Side of the aligned face crop fed to the recognizer.
pub const FACE_SIZE: u32 = 112;

/// A detected face in source image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // right eye, left eye, nose, mouth corners
}

/// Where the source image sits inside the padded detector canvas.
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn to_source(&self, normalized: f32, offset: f32) -> f32 {
        (normalized * DETECTOR_INPUT as f32 - offset) / self.scale
    }
}

fn letterbox(img: &DynamicImage) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = DETECTOR_INPUT as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let mut canvas = RgbImage::new(DETECTOR_INPUT, DETECTOR_INPUT);
    let offset_x = (DETECTOR_INPUT - new_w) / 2;
    let offset_y = (DETECTOR_INPUT - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized.to_rgb8(), offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Planar BGR tensor `[1, 3, H, W]` with values in `[0, 255]`.
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }
    Array4::from_shape_vec((1, 3, h as usize, w as usize), data)
        .map_err(|e| Error::Model(e.to_string()))
}

/// Run the YuNet detector on `img` and return faces in source coordinates.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, lb) = letterbox(img);
    let input = Value::from_array(bgr_tensor(&canvas)?).map_err(|e| Error::Model(e.to_string()))?;
    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| Error::Model(e.to_string()))?;

    let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Model(e.to_string()))?;
        owned.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = owned
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let heads = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize)?;
    let detections: Vec<Detection> = yunet::decode(&heads, score_threshold, DETECTOR_INPUT as usize)
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = lb.to_source(d.landmarks[k * 2], lb.offset_x);
                landmarks[k * 2 + 1] = lb.to_source(d.landmarks[k * 2 + 1], lb.offset_y);
            }
            Detection {
                bbox: [
                    lb.to_source(d.bbox[0], lb.offset_x),
                    lb.to_source(d.bbox[1], lb.offset_y),
                    d.bbox[2] * DETECTOR_INPUT as f32 / lb.scale,
                    d.bbox[3] * DETECTOR_INPUT as f32 / lb.scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    Ok(nms(&detections, nms_threshold))
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Rotate, scale and crop so the eyes land on the ArcFace reference points.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    // reference eye positions for a 112x112 crop
    const REF_LEFT: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT: (f32, f32) = (73.5, 51.5);

    let lm = &detection.landmarks;
    let (p, q) = ((lm[0], lm[1]), (lm[2], lm[3]));
    // YuNet reports the subject's right eye first, which is the left one in the image
    let (left, right) = if p.0 <= q.0 { (p, q) } else { (q, p) };

    let dx = right.0 - left.0;
    let dy = right.1 - left.1;
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if !eye_dist.is_finite() || eye_dist < 1.0 {
        return Err(Error::NoFaceDetected);
    }

    let unit = size as f32 / 112.0;
    let ref_dist = ((REF_RIGHT.0 - REF_LEFT.0).powi(2) + (REF_RIGHT.1 - REF_LEFT.1).powi(2)).sqrt();
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);
    let (sin, cos) = angle.sin_cos();

    // forward map: out = scale * R(-angle) * (src - eye_center) + ref_center
    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let ref_center = (
        (REF_LEFT.0 + REF_RIGHT.0) / 2.0 * unit,
        (REF_LEFT.1 + REF_RIGHT.1) / 2.0 * unit,
    );

    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let mut out = RgbImage::new(size, size);

    for (ox, oy, px) in out.enumerate_pixels_mut() {
        let u = (ox as f32 - ref_center.0) / scale;
        let v = (oy as f32 - ref_center.1) / scale;
        let sx = center.0 + u * cos - v * sin;
        let sy = center.1 + u * sin + v * cos;

        if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
            continue;
        }

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let (p00, p10) = (src.get_pixel(x0, y0), src.get_pixel(x1, y0));
        let (p01, p11) = (src.get_pixel(x0, y1), src.get_pixel(x1, y1));
        for c in 0..3 {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(DynamicImage::ImageRgb8(out))
}

/// Run the SFace recognizer on an aligned crop.
///
/// The raw model output is returned; no normalization is applied.
pub fn encode_face(session: &mut Session, face: &DynamicImage) -> Result<FeatureVector> {
    let face = face
        .resize_exact(FACE_SIZE, FACE_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let input = bgr_tensor(&face)
        .and_then(|t| Value::from_array(t).map_err(|e| Error::Model(e.to_string())))
        .map_err(|e| Error::Embedding(e.to_string()))?;
    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| Error::Embedding(e.to_string()))?;
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::Embedding(e.to_string()))?;

    // expecting [1, D]
    let dim = match shape.len() {
        2 => shape[1] as usize,
        _ => data.len(),
    };
    if dim == 0 || data.len() < dim {
        return Err(Error::Embedding(format!(
            "recognizer returned {} values for shape {:?}",
            data.len(),
            shape.iter().collect::<Vec<_>>()
        )));
    }
    if data[..dim].iter().any(|x| !x.is_finite()) {
        return Err(Error::Embedding("recognizer returned non-finite values".into()));
    }

    Ok(Array1::from(data[..dim].to_vec()))
}
