use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::DynamicImage;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default number of frames sampled from a video.
pub const DEFAULT_SAMPLE_FRAMES: usize = 32;

/// A decoded frame picked by the sampler.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the requested sample sequence (0..n).
    pub sample_index: usize,
    /// Frame number in the source video.
    pub source_index: usize,
    /// Presentation time, when the source knows its frame rate.
    pub timestamp: Option<Duration>,
    pub image: DynamicImage,
}

/// Anything that can report its length in frames and decode a frame by number.
pub trait FrameSource {
    fn frame_count(&self) -> usize;

    /// Frames per second, if known.
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    fn decode(&mut self, index: usize) -> Result<DynamicImage>;
}

/// `n` indices evenly spaced over `[0, total - 1]`, rounded to the nearest frame.
///
/// Duplicates are kept when `n` is close to `total`.
pub fn sample_indices(total: usize, n: usize) -> Vec<usize> {
    match (total, n) {
        (0, _) | (_, 0) => vec![],
        (_, 1) => vec![0],
        _ => {
            let last = (total - 1) as f64;
            let step = last / (n - 1) as f64;
            (0..n)
                .map(|i| ((i as f64 * step).round() as usize).min(total - 1))
                .collect()
        }
    }
}

/// Decode `n` uniformly spaced frames from `source`.
///
/// Fails up front with [`Error::InsufficientFrames`] when the source is
/// shorter than `n`; no frame is decoded in that case. Frames that fail to
/// decode are skipped, so the result may hold fewer than `n` frames.
pub fn sample_frames<S: FrameSource + ?Sized>(source: &mut S, n: usize) -> Result<Vec<Frame>> {
    let total = source.frame_count();
    if total < n {
        return Err(Error::InsufficientFrames {
            available: total,
            requested: n,
        });
    }

    let fps = source.frame_rate().filter(|fps| *fps > 0.0);
    let mut frames = Vec::with_capacity(n);
    for (sample_index, source_index) in sample_indices(total, n).into_iter().enumerate() {
        match source.decode(source_index) {
            Ok(image) => frames.push(Frame {
                sample_index,
                source_index,
                timestamp: fps.map(|fps| Duration::from_secs_f64(source_index as f64 / fps)),
                image,
            }),
            Err(e) => {
                log::debug!("skipping frame {} (sample {}): {}", source_index, sample_index, e);
            }
        }
    }

    log::debug!("sampled {}/{} frames out of {}", frames.len(), n, total);
    Ok(frames)
}

/// How often a running decoder process is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Video file decoded through the `ffprobe` / `ffmpeg` executables.
///
/// No decoder state is held between calls; each frame is produced by its own
/// short-lived process, so there is nothing to release on early exit. Every
/// process shares one deadline set at [`FfmpegVideo::open`] and is killed
/// when it passes.
pub struct FfmpegVideo {
    path: PathBuf,
    frame_count: usize,
    frame_rate: Option<f64>,
    deadline: Instant,
}

#[derive(Deserialize)]
struct Probe {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    nb_read_packets: Option<String>,
    r_frame_rate: Option<String>,
}

impl FfmpegVideo {
    /// Probe `path` for its frame count. Unreadable or truncated files fail immediately.
    ///
    /// Probing and all later decoding must finish within `budget`.
    pub fn open(path: impl AsRef<Path>, budget: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let deadline = Instant::now() + budget;
        let output = run_until(
            Command::new("ffprobe")
                .args(["-v", "error", "-select_streams", "v:0", "-count_packets"])
                .args(["-show_entries", "stream=nb_read_packets,r_frame_rate"])
                .args(["-of", "json"])
                .arg(&path),
            deadline,
        )?;

        if !output.status.success() {
            return Err(Error::MediaDecode(format!(
                "ffprobe rejected {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let (frame_count, frame_rate) = parse_probe(&output.stdout)?;
        log::debug!(
            "opened video {}: {} frames, {:?} fps",
            path.display(),
            frame_count,
            frame_rate
        );

        Ok(Self {
            path,
            frame_count,
            frame_rate,
            deadline,
        })
    }
}

impl FrameSource for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn decode(&mut self, index: usize) -> Result<DynamicImage> {
        let filter = format!("select=eq(n\\,{index})");
        let output = run_until(
            Command::new("ffmpeg")
                .args(["-v", "error", "-xerror", "-i"])
                .arg(&self.path)
                .args(["-vf", filter.as_str(), "-vsync", "0", "-frames:v", "1"])
                .args(["-f", "image2pipe", "-vcodec", "png", "-"]),
            self.deadline,
        )?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(Error::MediaDecode(format!(
                "frame {} of {} could not be decoded",
                index,
                self.path.display()
            )));
        }

        image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)
            .map_err(Error::decode)
    }
}

/// Run `cmd` to completion, killing it if it is still running at `deadline`.
fn run_until(cmd: &mut Command, deadline: Instant) -> Result<Output> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::MediaDecode(format!("failed to run {program}: {e}")))?;

    // drained on their own threads so a full pipe cannot stall the child
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                log::warn!("failed to kill {}: {}", program, e);
            }
            child.wait().ok();
            return Err(Error::MediaDecode(format!(
                "{program} did not finish before the decode deadline"
            )));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).ok();
        }
        buf
    })
}

fn parse_probe(raw: &[u8]) -> Result<(usize, Option<f64>)> {
    let probe: Probe = serde_json::from_slice(raw).map_err(Error::decode)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::MediaDecode("no video stream found".into()))?;

    let frame_count = stream
        .nb_read_packets
        .as_deref()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .ok_or_else(|| Error::MediaDecode("video does not report a frame count".into()))?;

    Ok((frame_count, stream.r_frame_rate.as_deref().and_then(parse_rate)))
}

/// Parse an ffprobe rational such as `30000/1001`.
fn parse_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0).then(|| num / den)
}
