use anyhow::{Context, Result as AnyResult};
use image::DynamicImage;
use ort::session::Session;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::face;
use crate::features::{FeatureMatrix, FeatureVector};
use crate::model::{self, ModelPaths};
use crate::video::{self, FrameSource};

/// Crops and aligns the most prominent face of an image.
pub trait FacePreprocessor {
    /// Fails with [`Error::NoFaceDetected`] when nothing scores above the detector threshold.
    fn detect_and_align(&mut self, image: &DynamicImage) -> Result<DynamicImage>;
}

/// Maps an aligned face to a fixed-length vector.
pub trait EmbeddingExtractor {
    fn embed(&mut self, face: &DynamicImage) -> Result<FeatureVector>;
}

/// What to do with a frame in which no face is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacePolicy {
    /// Abort the whole batch.
    Strict,
    /// Drop the frame and keep going.
    #[default]
    Lenient,
}

/// Embed every image in order and stack the results.
///
/// Under [`FacePolicy::Lenient`] images without a face are dropped, which
/// shrinks the batch; [`Error::EmptyBatch`] is returned if nothing survives.
pub fn embed_images<'a, P, E, I>(
    preprocessor: &mut P,
    extractor: &mut E,
    images: I,
    policy: FacePolicy,
) -> Result<FeatureMatrix>
where
    P: FacePreprocessor + ?Sized,
    E: EmbeddingExtractor + ?Sized,
    I: IntoIterator<Item = &'a DynamicImage>,
{
    let mut vectors = Vec::new();
    let mut dropped = 0usize;

    for image in images {
        let aligned = match preprocessor.detect_and_align(image) {
            Ok(aligned) => aligned,
            Err(Error::NoFaceDetected) if policy == FacePolicy::Lenient => {
                dropped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        vectors.push(extractor.embed(&aligned)?);
    }

    if dropped > 0 {
        log::debug!("dropped {} image(s) without a detectable face", dropped);
    }
    FeatureMatrix::aggregate(vectors)
}

/// YuNet detector plus eye alignment.
pub struct Detector {
    pub session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub face_size: u32,
}

impl FacePreprocessor for Detector {
    fn detect_and_align(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        let detections = face::detect_faces(
            &mut self.session,
            image,
            self.score_threshold,
            self.nms_threshold,
        )?;
        // nms output is sorted by score
        let best = detections.first().ok_or(Error::NoFaceDetected)?;
        log::debug!("best face score {:.3} at {:?}", best.score, best.bbox);
        face::align_face(image, best, self.face_size)
    }
}

/// SFace recognizer.
pub struct Encoder {
    pub session: Session,
}

impl EmbeddingExtractor for Encoder {
    fn embed(&mut self, face: &DynamicImage) -> Result<FeatureVector> {
        face::encode_face(&mut self.session, face)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    #[serde(flatten)]
    pub models: ModelPaths,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub face_size: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            models: ModelPaths::default(),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            face_size: face::FACE_SIZE,
        }
    }
}

/// Full pipeline: sample → detect → align → encode → aggregate
pub struct Pipeline {
    pub detector: Detector,
    pub encoder: Encoder,
}

impl Pipeline {
    pub fn new(opts: &PipelineOptions) -> AnyResult<Self> {
        Ok(Self {
            detector: Detector {
                session: model::detector_session(&opts.models).context("detector")?,
                score_threshold: opts.score_threshold,
                nms_threshold: opts.nms_threshold,
                face_size: opts.face_size,
            },
            encoder: Encoder {
                session: model::recog_session(&opts.models).context("recognizer")?,
            },
        })
    }

    /// One-row matrix for a still image. A missing face is an error.
    pub fn extract_image(&mut self, image: &DynamicImage) -> Result<FeatureMatrix> {
        embed_images(
            &mut self.detector,
            &mut self.encoder,
            [image],
            FacePolicy::Strict,
        )
    }

    /// Sample `frames` frames from `source` and embed each one.
    pub fn extract_video<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        frames: usize,
        policy: FacePolicy,
    ) -> Result<FeatureMatrix> {
        let sampled = video::sample_frames(source, frames)?;
        embed_images(
            &mut self.detector,
            &mut self.encoder,
            sampled.iter().map(|f| &f.image),
            policy,
        )
    }
}
