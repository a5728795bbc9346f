use thiserror::Error;

/// Per-photo failure. None of these abort a batch.
#[derive(Debug, Error)]
pub enum CropError {
    #[error("no face detected above the confidence threshold")]
    NoFaceDetected,

    #[error("degenerate head geometry: head span {head_span:.3}px")]
    DegenerateGeometry { head_span: f64 },

    #[error("crop cannot be resolved inside the source image: {reason}")]
    UnresolvableCrop { reason: String },

    #[error("failed to encode or write output: {0}")]
    EncodeError(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("face detector failed: {0}")]
    Detection(String),
}

impl CropError {
    pub(crate) fn unresolvable(reason: impl Into<String>) -> Self {
        Self::UnresolvableCrop {
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => "no_face_detected",
            Self::DegenerateGeometry { .. } => "degenerate_geometry",
            Self::UnresolvableCrop { .. } => "unresolvable_crop",
            Self::EncodeError(_) => "encode_error",
            Self::Decode(_) => "decode_error",
            Self::Detection(_) => "detection_error",
        }
    }
}
