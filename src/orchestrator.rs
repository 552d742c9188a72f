use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deepcheck_vision::{compare, FeatureMatrix, SimilarityResult};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::error::DetectError;
use crate::media::{MediaInput, MediaKind, Role, Upload};
use crate::scratch::Scratch;

/// Request lifecycle. `Failed` can follow any stage and is always followed by `Cleaned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Stored,
    ProcessedReal,
    ProcessedFake,
    Compared,
    Failed,
    Cleaned,
    Responded,
}

struct Trace {
    id: Uuid,
    stage: Stage,
}

impl Trace {
    fn new(id: Uuid) -> Self {
        debug!("request {}: {:?}", id, Stage::Received);
        Self {
            id,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("request {}: {:?} -> {:?}", self.id, self.stage, next);
        self.stage = next;
    }
}

#[derive(Debug, Clone)]
pub struct Limits {
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
    pub work_dir: PathBuf,
}

impl From<&Config> for Limits {
    fn from(cfg: &Config) -> Self {
        Self {
            max_upload_bytes: cfg.server.max_upload_bytes,
            request_timeout: cfg.server.request_timeout(),
            work_dir: cfg.server.work_dir(),
        }
    }
}

/// Drives validate → store → extract → compare for one pair of uploads.
pub struct Orchestrator {
    analyzer: Arc<dyn Analyzer>,
    limits: Limits,
}

impl Orchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>, limits: Limits) -> Self {
        Self { analyzer, limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub async fn run(
        &self,
        real: Option<Upload>,
        fake: Option<Upload>,
    ) -> Result<SimilarityResult, DetectError> {
        let start = Instant::now();
        let mut trace = Trace::new(Uuid::new_v4());

        let outcome = self.process(&mut trace, real, fake).await;
        if let Err(e) = &outcome {
            trace.advance(Stage::Failed);
            warn!("request {}: {}", trace.id, e);
        }
        // the scratch dir, if any, was dropped inside `process`
        trace.advance(Stage::Cleaned);

        if let Ok(r) = &outcome {
            info!(
                "request {}: cosine {:.4} euclidean {:.4} deepfake {} in {:?}",
                trace.id,
                r.cosine,
                r.euclidean,
                r.is_likely_deepfake,
                start.elapsed()
            );
        }
        trace.advance(Stage::Responded);
        outcome
    }

    async fn process(
        &self,
        trace: &mut Trace,
        real: Option<Upload>,
        fake: Option<Upload>,
    ) -> Result<SimilarityResult, DetectError> {
        let max = self.limits.max_upload_bytes;
        let real = MediaInput::validate(Role::Real, real, max)?;
        let fake = MediaInput::validate(Role::Fake, fake, max)?;
        trace.advance(Stage::Validated);

        let scratch = Scratch::create(&self.limits.work_dir, trace.id)?;
        let real_path = scratch.store(&real).await?;
        let fake_path = scratch.store(&fake).await?;
        debug!(
            "request {}: stored {} ({:?}, {} bytes) and {} ({:?}, {} bytes)",
            trace.id,
            real.file_name,
            real.kind,
            real.size(),
            fake.file_name,
            fake.kind,
            fake.size()
        );
        trace.advance(Stage::Stored);

        // one deadline covers both extractions
        let deadline = tokio::time::Instant::now() + self.limits.request_timeout;
        let a = self.extract(real_path, real.kind, deadline).await?;
        trace.advance(Stage::ProcessedReal);
        let b = self.extract(fake_path, fake.kind, deadline).await?;
        trace.advance(Stage::ProcessedFake);
        debug!(
            "request {}: feature shapes {:?} / {:?}",
            trace.id,
            a.shape(),
            b.shape()
        );

        let result = compare(&a, &b)?;
        trace.advance(Stage::Compared);

        scratch.close();
        Ok(result)
    }

    /// Run the analyzer on the blocking pool, giving up at `deadline`.
    async fn extract(
        &self,
        path: PathBuf,
        kind: MediaKind,
        deadline: tokio::time::Instant,
    ) -> Result<FeatureMatrix, DetectError> {
        let analyzer = Arc::clone(&self.analyzer);
        let work = tokio::task::spawn_blocking(move || analyzer.features(&path, kind));
        match tokio::time::timeout_at(deadline, work).await {
            Err(_) => Err(DetectError::Timeout(self.limits.request_timeout)),
            Ok(Err(join)) => Err(DetectError::Worker(join.to_string())),
            Ok(Ok(features)) => Ok(features?),
        }
    }
}

/// Compare two local files with the same validation and pipeline as the server.
pub fn compare_paths(
    analyzer: &dyn Analyzer,
    real: &Path,
    fake: &Path,
    max_upload_bytes: usize,
) -> Result<SimilarityResult, DetectError> {
    let load = |role: Role, path: &Path| -> Result<MediaInput, DetectError> {
        let upload = Upload {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            contents: std::fs::read(path)?,
        };
        Ok(MediaInput::validate(role, Some(upload), max_upload_bytes)?)
    };
    let real_kind = load(Role::Real, real)?.kind;
    let fake_kind = load(Role::Fake, fake)?.kind;

    let a = analyzer.features(real, real_kind)?;
    let b = analyzer.features(fake, fake_kind)?;
    Ok(compare(&a, &b)?)
}
