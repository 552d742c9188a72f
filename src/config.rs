use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use deepcheck_vision::video::DEFAULT_SAMPLE_FRAMES;
use deepcheck_vision::{FacePolicy, PipelineOptions};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("DEEPCHECK_CONFIG_PATH").unwrap_or("/usr/local/etc/deepcheck/config.toml"))
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sampling: SamplingConfig,
    pub models: PipelineOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Per-file upload limit in bytes.
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    /// Parent of the per-request scratch directories.
    pub work_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8877".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 120,
            work_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "deepcheck")
                .map(|dirs| dirs.cache_dir().join("requests"))
                .unwrap_or_else(|| std::env::temp_dir().join("deepcheck"))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Frames sampled from every video.
    pub frames: usize,
    /// Whether a video frame without a face is dropped or fails the request.
    pub video_faces: FacePolicy,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frames: DEFAULT_SAMPLE_FRAMES,
            video_faces: FacePolicy::Lenient,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.sampling.frames == 0 {
            anyhow::bail!("sampling.frames must be at least 1");
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be positive");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be positive");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
