//! End-to-end tests of the HTTP surface. The face model is replaced by a
//! deterministic analyzer; everything else (validation, scratch storage,
//! frame sampling, aggregation, comparison) is the real code.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use deepcheck::analyzer::Analyzer;
use deepcheck::media::MediaKind;
use deepcheck::orchestrator::{Limits, Orchestrator};
use deepcheck::server::{create_app, AppState};
use deepcheck::vision::video::{sample_frames, FrameSource};
use deepcheck::vision::{Error, FeatureMatrix, Result};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array1;
use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "deepcheck-test-boundary";
const SAMPLE_FRAMES: usize = 32;

/// Images embed as their first bytes; videos are text files `frames:<count>`.
struct FakeAnalyzer {
    delay: Option<Duration>,
}

struct TextClip(usize);

impl FrameSource for TextClip {
    fn frame_count(&self) -> usize {
        self.0
    }

    fn decode(&mut self, index: usize) -> Result<DynamicImage> {
        let px = Rgb([(index % 256) as u8, 90, 30]);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, px)))
    }
}

impl Analyzer for FakeAnalyzer {
    fn features(&self, path: &Path, kind: MediaKind) -> Result<FeatureMatrix> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let bytes = std::fs::read(path)?;
        match kind {
            MediaKind::Image => {
                if bytes.starts_with(b"noface") {
                    return Err(Error::NoFaceDetected);
                }
                let v: Vec<f32> = (0..8)
                    .map(|i| bytes.get(i).copied().unwrap_or(0) as f32 + 1.0)
                    .collect();
                FeatureMatrix::aggregate(vec![Array1::from(v)])
            }
            MediaKind::Video => {
                let text = String::from_utf8_lossy(&bytes);
                let total = text
                    .trim()
                    .strip_prefix("frames:")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| Error::MediaDecode("not a video".into()))?;
                let frames = sample_frames(&mut TextClip(total), SAMPLE_FRAMES)?;
                let rows = frames
                    .iter()
                    .map(|f| {
                        let px = f.image.get_pixel(0, 0);
                        Array1::from(vec![px[0] as f32 + 1.0, px[1] as f32, px[2] as f32])
                    })
                    .collect();
                FeatureMatrix::aggregate(rows)
            }
        }
    }
}

struct Server {
    app: Router,
    root: TempDir,
}

impl Server {
    fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    /// Entries still present under the work dir.
    fn leftovers(&self) -> usize {
        std::fs::read_dir(self.work_dir())
            .map(|d| d.count())
            .unwrap_or(0)
    }
}

fn server_with(delay: Option<Duration>, timeout: Duration) -> Server {
    let root = tempfile::tempdir().unwrap();
    let limits = Limits {
        max_upload_bytes: 1024,
        request_timeout: timeout,
        work_dir: root.path().join("work"),
    };
    let orchestrator = Orchestrator::new(Arc::new(FakeAnalyzer { delay }), limits);
    Server {
        app: create_app(AppState::new(orchestrator)),
        root,
    }
}

#[fixture]
fn server() -> Server {
    server_with(None, Duration::from_secs(10))
}

fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, contents) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn detect_request(parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Same as [`detect_request`] but announces its length up front, as browsers do.
fn sized_detect_request(parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    let body = multipart_body(parts);
    Request::builder()
        .method("POST")
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[rstest]
#[tokio::test]
async fn identical_images_match(server: Server) {
    let req = detect_request(&[
        ("realMedia", "me.jpg", b"same face bytes"),
        ("fakeMedia", "me-too.JPG", b"same face bytes"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Analysis completed successfully");
    assert!((body["cosine_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(body["euclidean_similarity"].as_f64().unwrap(), 0.0);
    assert_eq!(body["is_likely_deepfake"], false);
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn different_images_are_scored(server: Server) {
    let req = detect_request(&[
        ("realMedia", "a.png", &[255, 0, 0, 0, 0, 0, 0, 0]),
        ("fakeMedia", "b.png", &[0, 0, 0, 0, 0, 0, 0, 255]),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["cosine_similarity"].as_f64().unwrap() < 0.7);
    assert!(body["euclidean_similarity"].as_f64().unwrap() > 300.0);
    assert_eq!(body["is_likely_deepfake"], true);
}

#[rstest]
#[tokio::test]
async fn unsupported_extension_is_rejected(server: Server) {
    let req = detect_request(&[
        ("realMedia", "face.gif", b"GIF89a"),
        ("fakeMedia", "face.png", b"png"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported file type");
    assert!(body["message"].as_str().unwrap().contains("face.gif"));
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn missing_field_is_rejected(server: Server) {
    let req = detect_request(&[("realMedia", "face.png", b"png")]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing files");
    assert_eq!(
        body["message"],
        "Both realMedia and fakeMedia files are required"
    );
}

#[rstest]
#[tokio::test]
async fn oversized_file_is_rejected(server: Server) {
    let big = vec![7u8; 2000];
    let req = detect_request(&[
        ("realMedia", "face.png", b"png"),
        ("fakeMedia", "face.png", &big),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large");
    assert_eq!(server.leftovers(), 0);
}

/// Larger than twice the per-file limit plus form overhead.
fn huge_file() -> Vec<u8> {
    vec![7u8; 2 * 1024 + 64 * 1024 + 10]
}

#[rstest]
#[tokio::test]
async fn body_past_transport_limit_is_json_400(server: Server) {
    let big = huge_file();
    let req = sized_detect_request(&[
        ("realMedia", "face.png", b"png"),
        ("fakeMedia", "clip.mp4", &big),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large");
    assert_eq!(body["message"], "Files must be less than 1024 bytes");
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn unsized_body_past_transport_limit_is_json_400(server: Server) {
    let big = huge_file();
    let req = detect_request(&[
        ("realMedia", "face.png", b"png"),
        ("fakeMedia", "clip.mp4", &big),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
    assert!(body["message"].is_string(), "{body}");
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn non_multipart_body_is_json_400(server: Server) {
    let req = Request::builder()
        .method("POST")
        .uri("/detect")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"realMedia":"a.png"}"#))
        .unwrap();
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid upload");
    assert!(body["message"].as_str().unwrap().starts_with("malformed multipart form"));
}

#[rstest]
#[tokio::test]
async fn short_video_fails_and_cleans_up(server: Server) {
    let req = detect_request(&[
        ("realMedia", "clip.mp4", b"frames:5"),
        ("fakeMedia", "clip.mov", b"frames:300"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Server error");
    assert_eq!(
        body["message"],
        "video has only 5 frames, but 32 frames were requested"
    );
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn identical_videos_match(server: Server) {
    let req = detect_request(&[
        ("realMedia", "a.mp4", b"frames:32"),
        ("fakeMedia", "b.avi", b"frames:32"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert!((body["cosine_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(body["is_likely_deepfake"], false);
}

#[rstest]
#[tokio::test]
async fn image_against_video_is_a_shape_mismatch(server: Server) {
    let req = detect_request(&[
        ("realMedia", "face.png", b"png bytes"),
        ("fakeMedia", "clip.mp4", b"frames:64"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().starts_with("shape mismatch"));
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn faceless_image_is_a_server_error(server: Server) {
    let req = detect_request(&[
        ("realMedia", "face.png", b"png bytes"),
        ("fakeMedia", "wall.jpeg", b"noface"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "no face detected in image");
}

#[tokio::test]
async fn slow_processing_times_out() {
    let server = server_with(Some(Duration::from_millis(300)), Duration::from_millis(20));
    let req = detect_request(&[
        ("realMedia", "a.png", b"x"),
        ("fakeMedia", "b.png", b"x"),
    ]);
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("did not finish"));
    assert_eq!(server.leftovers(), 0);
}

#[rstest]
#[tokio::test]
async fn health_reports_timestamp(server: Server) {
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&server.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let ts = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "{ts}");
}

#[rstest]
#[tokio::test]
async fn unknown_route_is_404(server: Server) {
    let req = Request::builder()
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&server.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
