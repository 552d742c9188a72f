use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use deepcheck_vision::{Error, FeatureMatrix, FfmpegVideo, Pipeline};

use crate::config::{Config, SamplingConfig};
use crate::media::MediaKind;

/// Turns a stored media file into a feature matrix.
pub trait Analyzer: Send + Sync {
    fn features(&self, path: &Path, kind: MediaKind) -> deepcheck_vision::Result<FeatureMatrix>;
}

/// [`Analyzer`] backed by the ONNX face models.
///
/// The sessions are shared, so one extraction runs at a time.
pub struct ModelAnalyzer {
    pipeline: Mutex<Pipeline>,
    sampling: SamplingConfig,
    /// Upper bound on decoding one video, so a stalled ffmpeg cannot hold the lock.
    decode_budget: Duration,
}

impl ModelAnalyzer {
    pub fn new(cfg: &Config) -> Result<Self> {
        let pipeline =
            Pipeline::new(&cfg.models).context("Failed to initialize face recognition pipeline")?;
        Ok(Self {
            pipeline: Mutex::new(pipeline),
            sampling: cfg.sampling,
            decode_budget: cfg.server.request_timeout(),
        })
    }
}

impl Analyzer for ModelAnalyzer {
    fn features(&self, path: &Path, kind: MediaKind) -> deepcheck_vision::Result<FeatureMatrix> {
        // poisoned only if an earlier extraction panicked
        let mut pipeline = self.pipeline.lock().unwrap_or_else(|p| p.into_inner());
        match kind {
            MediaKind::Image => {
                let img = image::open(path).map_err(|e| Error::MediaDecode(e.to_string()))?;
                pipeline.extract_image(&img)
            }
            MediaKind::Video => {
                let mut video = FfmpegVideo::open(path, self.decode_budget)?;
                pipeline.extract_video(&mut video, self.sampling.frames, self.sampling.video_faces)
            }
        }
    }
}
