//! Normalizes raw detector output and picks the single subject face.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::CropError;
use crate::face::FaceBox;

/// Sanity bounds for a detection relative to the whole image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plausibility {
    pub enabled: bool,
    /// Minimum box area as a fraction of the image area.
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
    /// Box `width / height` bounds.
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl Default for Plausibility {
    fn default() -> Self {
        Self {
            enabled: true,
            min_area_ratio: 0.005,
            max_area_ratio: 0.9,
            min_aspect: 0.3,
            max_aspect: 2.5,
        }
    }
}

impl Plausibility {
    fn accepts(&self, face: &FaceBox, image_width: u32, image_height: u32) -> bool {
        if !self.enabled {
            return true;
        }
        let image_area = image_width as f64 * image_height as f64;
        let area_ratio = face.area() / image_area;
        let aspect = face.width / face.height;
        (self.min_area_ratio..=self.max_area_ratio).contains(&area_ratio)
            && (self.min_aspect..=self.max_aspect).contains(&aspect)
    }
}

#[derive(Debug, Clone)]
pub struct FaceSelector {
    pub confidence_threshold: f64,
    pub plausibility: Plausibility,
}

impl FaceSelector {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            plausibility: Plausibility {
                enabled: false,
                ..Plausibility::default()
            },
        }
    }

    pub fn with_plausibility(mut self, plausibility: Plausibility) -> Self {
        self.plausibility = plausibility;
        self
    }

    /// Choose the primary face: the largest surviving box, ties broken by
    /// higher confidence and then by leftmost `x`.
    pub fn select(
        &self,
        detections: &[FaceBox],
        image_width: u32,
        image_height: u32,
    ) -> Result<FaceBox, CropError> {
        let candidates: Vec<FaceBox> = detections
            .iter()
            .filter_map(|d| normalize(d, image_width, image_height))
            .filter(|d| d.confidence >= self.confidence_threshold)
            .filter(|d| self.plausibility.accepts(d, image_width, image_height))
            .collect();

        log::debug!(
            "{} of {} detection(s) survived validation",
            candidates.len(),
            detections.len()
        );

        candidates
            .into_iter()
            .max_by(compare_candidates)
            .ok_or(CropError::NoFaceDetected)
    }
}

/// Orders so that the preferred face compares greatest.
fn compare_candidates(a: &FaceBox, b: &FaceBox) -> Ordering {
    a.area()
        .total_cmp(&b.area())
        .then(a.confidence.total_cmp(&b.confidence))
        .then(b.x.total_cmp(&a.x))
}

/// Drop malformed boxes and clip the rest to the image.
fn normalize(face: &FaceBox, image_width: u32, image_height: u32) -> Option<FaceBox> {
    let values = [face.x, face.y, face.width, face.height, face.confidence];
    if values.iter().any(|v| !v.is_finite()) || face.width <= 0.0 || face.height <= 0.0 {
        return None;
    }

    let (w, h) = (image_width as f64, image_height as f64);
    let left = face.x.clamp(0.0, w);
    let top = face.y.clamp(0.0, h);
    let right = face.right().clamp(0.0, w);
    let bottom = face.bottom().clamp(0.0, h);
    if right - left <= 0.0 || bottom - top <= 0.0 {
        return None;
    }

    Some(FaceBox::new(
        left,
        top,
        right - left,
        bottom - top,
        face.confidence.clamp(0.0, 1.0),
    ))
}
