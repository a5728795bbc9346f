//! Face-anchored crop geometry.
//!
//! Vertical layout of the frame, top to bottom:
//! `target_top_margin` of blank space, then the head (hair allowance, face
//! box, chin clearance) filling `target_head_ratio` of the height, then
//! whatever remains below the chin.

use serde::{Deserialize, Serialize};

use crate::error::CropError;
use crate::face::FaceBox;
use crate::hair::{HairRatio, HairThresholds};

/// Static cropping parameters shared read-only by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub output_width: u32,
    pub output_height: u32,
    /// Fraction of the frame height occupied by the head span, in (0, 1).
    pub target_head_ratio: f64,
    /// Fraction of the frame height left above the head top, in [0, 1).
    pub target_top_margin: f64,
    /// Chin clearance below the face box, as a fraction of face height.
    pub chin_extra_ratio: f64,
    pub hair_ratio: HairRatio,
    pub hair_thresholds: HairThresholds,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            output_width: 360,
            output_height: 450,
            target_head_ratio: 0.75,
            target_top_margin: 0.08,
            chin_extra_ratio: 0.12,
            hair_ratio: HairRatio::default(),
            hair_thresholds: HairThresholds::default(),
        }
    }
}

impl CropConfig {
    /// Output `width / height`.
    pub fn aspect(&self) -> f64 {
        self.output_width as f64 / self.output_height as f64
    }
}

/// Crop region in source pixel coordinates. May lie partly outside the image
/// until it passes through [`crate::bounds::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRectangle {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRectangle {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// True when fully inside `[0, image_width] x [0, image_height]`, allowing
    /// `tolerance` pixels of floating error on each edge.
    pub fn is_within(&self, image_width: u32, image_height: u32, tolerance: f64) -> bool {
        self.left >= -tolerance
            && self.top >= -tolerance
            && self.right() <= image_width as f64 + tolerance
            && self.bottom() <= image_height as f64 + tolerance
    }
}

/// Intermediate vertical landmarks, kept for audit output and the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadSpan {
    pub head_top: f64,
    pub chin_bottom: f64,
}

impl HeadSpan {
    pub fn new(face: &FaceBox, hair_allowance_px: f64, chin_extra_ratio: f64) -> Self {
        Self {
            head_top: face.y - hair_allowance_px,
            chin_bottom: face.bottom() + chin_extra_ratio * face.height,
        }
    }

    pub fn height(&self) -> f64 {
        self.chin_bottom - self.head_top
    }
}

/// Derive the unclamped crop rectangle for a face.
pub fn compute_crop_rect(
    face: &FaceBox,
    hair_allowance_px: f64,
    config: &CropConfig,
) -> Result<CropRectangle, CropError> {
    let span = HeadSpan::new(face, hair_allowance_px, config.chin_extra_ratio);
    let head_span = span.height();
    if !head_span.is_finite() || head_span <= 0.0 {
        return Err(CropError::DegenerateGeometry { head_span });
    }

    let height = head_span / config.target_head_ratio;
    let width = height * config.aspect();
    let top = span.head_top - config.target_top_margin * height;
    let left = face.center_x() - width / 2.0;

    let rect = CropRectangle {
        left,
        top,
        width,
        height,
    };
    if !rect.is_finite() || width <= 0.0 {
        return Err(CropError::DegenerateGeometry { head_span });
    }

    log::debug!(
        "head span {:.2}px -> crop {:.2}x{:.2} at ({:.2}, {:.2})",
        head_span,
        width,
        height,
        left,
        top
    );
    Ok(rect)
}
