use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use image::DynamicImage;
use ort::session::Session;

use crate::error::CropError;
use crate::face::{self, FaceBox};

/// Pluggable face detection backend.
///
/// Implementations return raw detections in source pixel coordinates; empty
/// output is not an error here; the validator turns it into
/// [`CropError::NoFaceDetected`].
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, CropError>;
}

/// YuNet ONNX detector shared by all batch workers.
pub struct YuNetDetector {
    session: Mutex<Session>,
    score_threshold: f32,
    nms_threshold: f32,
}

impl YuNetDetector {
    pub fn load(model_path: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        log::info!("Loading face detector from {}", model_path.display());
        Ok(Self {
            session: Mutex::new(crate::model::detector_session(model_path)?),
            score_threshold,
            nms_threshold,
        })
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, CropError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| CropError::Detection("detector session poisoned".into()))?;
        face::detect_faces(
            &mut session,
            image,
            self.score_threshold,
            self.nms_threshold,
        )
        .map_err(|e| CropError::Detection(format!("{e:#}")))
    }
}
