//! Adaptive hair allowance above the detected face box.
//!
//! Face detectors bound the forehead, not the crown. The allowance is a
//! fraction of face height that blends a size adjustment and a position
//! adjustment onto a base ratio, then clamps.

use serde::{Deserialize, Serialize};

use crate::face::FaceBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairRatio {
    pub base: f64,
    pub min: f64,
    pub max: f64,
    pub small_face_multiplier: f64,
    pub large_face_multiplier: f64,
    pub top_position_multiplier: f64,
    pub bottom_position_multiplier: f64,
}

impl Default for HairRatio {
    fn default() -> Self {
        Self {
            base: 0.25,
            min: 0.15,
            max: 0.35,
            small_face_multiplier: 1.1,
            large_face_multiplier: 0.6,
            top_position_multiplier: 0.6,
            bottom_position_multiplier: 1.0,
        }
    }
}

/// Classification cut-offs, as fractions of image height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairThresholds {
    /// Face is small when `face.height < small_face * image_height`.
    pub small_face: f64,
    /// Face is large when `face.height > large_face * image_height`.
    pub large_face: f64,
    /// Face is near the top when `face.y < near_top * image_height`.
    pub near_top: f64,
    /// Face is near the bottom when its bottom edge exceeds `near_bottom * image_height`.
    pub near_bottom: f64,
}

impl Default for HairThresholds {
    fn default() -> Self {
        Self {
            small_face: 0.12,
            large_face: 0.30,
            near_top: 0.15,
            near_bottom: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSize {
    Small,
    Regular,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HairEstimate {
    pub size: FaceSize,
    pub near_top: bool,
    pub near_bottom: bool,
    /// Final ratio after clamping.
    pub ratio: f64,
    pub allowance_px: f64,
}

pub fn classify_size(face: &FaceBox, image_height: f64, thresholds: &HairThresholds) -> FaceSize {
    if face.height < thresholds.small_face * image_height {
        FaceSize::Small
    } else if face.height > thresholds.large_face * image_height {
        FaceSize::Large
    } else {
        FaceSize::Regular
    }
}

/// Blend the multipliers onto `base` and clamp into `[min, max]`.
///
/// NaN (from a hostile multiplier) collapses to `min`.
pub fn blend_ratio(
    hair: &HairRatio,
    size: FaceSize,
    near_top: bool,
    near_bottom: bool,
) -> f64 {
    let mut r = hair.base;
    r *= match size {
        FaceSize::Small => hair.small_face_multiplier,
        FaceSize::Large => hair.large_face_multiplier,
        FaceSize::Regular => 1.0,
    };
    if near_top {
        r *= hair.top_position_multiplier;
    }
    if near_bottom {
        r *= hair.bottom_position_multiplier;
    }
    r.max(hair.min).min(hair.max)
}

pub fn estimate(
    face: &FaceBox,
    image_height: u32,
    hair: &HairRatio,
    thresholds: &HairThresholds,
) -> HairEstimate {
    let image_height = image_height as f64;
    let size = classify_size(face, image_height, thresholds);
    let near_top = face.y < thresholds.near_top * image_height;
    let near_bottom = face.bottom() > thresholds.near_bottom * image_height;
    let ratio = blend_ratio(hair, size, near_top, near_bottom);

    log::debug!(
        "hair ratio {:.4} (size {:?}, near_top {}, near_bottom {})",
        ratio,
        size,
        near_top,
        near_bottom
    );

    HairEstimate {
        size,
        near_top,
        near_bottom,
        ratio,
        allowance_px: ratio * face.height,
    }
}

/// Hair height in pixels above `face.y`.
pub fn hair_allowance(
    face: &FaceBox,
    image_height: u32,
    hair: &HairRatio,
    thresholds: &HairThresholds,
) -> f64 {
    estimate(face, image_height, hair, thresholds).allowance_px
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn neutral() -> HairRatio {
        HairRatio {
            base: 0.25,
            min: 0.0,
            max: 1.0,
            small_face_multiplier: 2.0,
            large_face_multiplier: 0.5,
            top_position_multiplier: 0.8,
            bottom_position_multiplier: 1.2,
        }
    }

    #[test]
    fn regular_centered_face_uses_base() {
        // 240 / 1000 = 0.24 of height, y = 400, bottom = 640
        let face = FaceBox::new(100.0, 400.0, 200.0, 240.0, 0.9);
        let est = estimate(&face, 1000, &neutral(), &HairThresholds::default());
        assert_eq!(est.size, FaceSize::Regular);
        assert!(!est.near_top && !est.near_bottom);
        assert_relative_eq!(est.ratio, 0.25);
        assert_relative_eq!(est.allowance_px, 60.0);
    }

    #[test]
    fn size_classes() {
        let t = HairThresholds::default();
        let small = FaceBox::new(0.0, 400.0, 100.0, 119.0, 1.0);
        let large = FaceBox::new(0.0, 300.0, 100.0, 301.0, 1.0);
        let edge = FaceBox::new(0.0, 300.0, 100.0, 120.0, 1.0);
        assert_eq!(classify_size(&small, 1000.0, &t), FaceSize::Small);
        assert_eq!(classify_size(&large, 1000.0, &t), FaceSize::Large);
        assert_eq!(classify_size(&edge, 1000.0, &t), FaceSize::Regular);
    }

    #[test]
    fn size_and_position_multiply() {
        // small (100 < 120) and near top (y = 100 < 150)
        let face = FaceBox::new(0.0, 100.0, 80.0, 100.0, 1.0);
        let est = estimate(&face, 1000, &neutral(), &HairThresholds::default());
        assert_eq!(est.size, FaceSize::Small);
        assert!(est.near_top);
        assert_relative_eq!(est.ratio, 0.25 * 2.0 * 0.8);
    }

    #[test]
    fn near_bottom_applies_bottom_multiplier() {
        // large (400 > 300) and bottom = 900 > 850
        let face = FaceBox::new(0.0, 500.0, 300.0, 400.0, 1.0);
        let est = estimate(&face, 1000, &neutral(), &HairThresholds::default());
        assert_eq!(est.size, FaceSize::Large);
        assert!(est.near_bottom && !est.near_top);
        assert_relative_eq!(est.ratio, 0.25 * 0.5 * 1.2);
    }

    #[test]
    fn ratio_is_always_clamped() {
        let defaults = HairRatio::default();
        let extremes = [0.0, 1e-9, 0.5, 1.0, 7.0, 1e12, f64::INFINITY, f64::NAN];
        let faces = [
            FaceBox::new(0.0, 10.0, 50.0, 50.0, 1.0),
            FaceBox::new(0.0, 400.0, 200.0, 240.0, 1.0),
            FaceBox::new(0.0, 500.0, 300.0, 490.0, 1.0),
        ];
        for &m in &extremes {
            let hair = HairRatio {
                small_face_multiplier: m,
                large_face_multiplier: m,
                top_position_multiplier: m,
                bottom_position_multiplier: m,
                ..defaults.clone()
            };
            for face in &faces {
                let r = estimate(face, 1000, &hair, &HairThresholds::default()).ratio;
                assert!(r >= hair.min && r <= hair.max, "ratio {r} for multiplier {m}");
            }
        }
    }

    #[test]
    fn deterministic() {
        let face = FaceBox::new(33.0, 71.0, 180.0, 211.0, 0.8);
        let a = hair_allowance(&face, 777, &HairRatio::default(), &HairThresholds::default());
        let b = hair_allowance(&face, 777, &HairRatio::default(), &HairThresholds::default());
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
