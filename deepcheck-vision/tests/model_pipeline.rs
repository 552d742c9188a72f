//! Runs the real ONNX models. Skipped unless both model files are present
//! (see `ModelPaths`, overridable at build time with `DEEPCHECK_MODEL_DIR`).

use anyhow::Result;
use deepcheck_vision::{compare, Error, Pipeline, PipelineOptions};
use image::DynamicImage;

fn pipeline() -> Result<Option<Pipeline>> {
    env_logger::try_init().ok();
    let opts = PipelineOptions::default();
    if !opts.models.exist() {
        eprintln!("Skipping: models not found under {:?}", opts.models.detector.parent());
        return Ok(None);
    }
    Ok(Some(Pipeline::new(&opts)?))
}

#[test]
fn blank_image_has_no_face() -> Result<()> {
    let Some(mut pipeline) = pipeline()? else {
        return Ok(());
    };
    let blank = DynamicImage::new_rgb8(320, 240);
    let err = pipeline.extract_image(&blank).unwrap_err();
    assert!(matches!(err, Error::NoFaceDetected), "got {err}");
    Ok(())
}

#[test]
fn same_photo_matches_itself() -> Result<()> {
    let Some(mut pipeline) = pipeline()? else {
        return Ok(());
    };
    let path = "test_faces/face.jpg";
    if !std::path::Path::new(path).exists() {
        eprintln!("Skipping: {path} not found");
        return Ok(());
    }

    let img = image::open(path)?;
    let a = pipeline.extract_image(&img)?;
    let b = pipeline.extract_image(&img)?;
    let r = compare(&a, &b)?;

    println!("cosine {:.4} euclidean {:.4}", r.cosine, r.euclidean);
    assert!((r.cosine - 1.0).abs() < 1e-4);
    assert!(!r.is_likely_deepfake);
    Ok(())
}
