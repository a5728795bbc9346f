use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};

use crate::bounds::{self, CropWarning};
use crate::detector::FaceDetector;
use crate::error::CropError;
use crate::executor;
use crate::face::FaceBox;
use crate::geometry::{self, CropConfig, CropRectangle, HeadSpan};
use crate::hair::{self, HairEstimate};
use crate::validate::FaceSelector;

/// Every geometric decision made for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPlan {
    pub image_width: u32,
    pub image_height: u32,
    pub face: FaceBox,
    pub hair: HairEstimate,
    pub head: HeadSpan,
    /// Rectangle before bounds resolution; may extend past the image.
    pub unclamped: CropRectangle,
    pub resolved: CropRectangle,
    pub warnings: Vec<CropWarning>,
}

/// A framed portrait plus the plan that produced it.
#[derive(Debug, Clone)]
pub struct CropOutcome {
    pub plan: CropPlan,
    pub image: RgbImage,
}

impl CropOutcome {
    pub fn warnings(&self) -> &[CropWarning] {
        &self.plan.warnings
    }
}

/// Hair allowance -> geometry -> bounds for an already chosen face.
pub fn plan_crop(
    face: &FaceBox,
    image_width: u32,
    image_height: u32,
    config: &CropConfig,
) -> Result<CropPlan, CropError> {
    let hair = hair::estimate(
        face,
        image_height,
        &config.hair_ratio,
        &config.hair_thresholds,
    );
    let head = HeadSpan::new(face, hair.allowance_px, config.chin_extra_ratio);
    let unclamped = geometry::compute_crop_rect(face, hair.allowance_px, config)?;
    let resolved = bounds::resolve(
        unclamped,
        (face.center_x(), face.center_y()),
        image_width,
        image_height,
    )?;

    Ok(CropPlan {
        image_width,
        image_height,
        face: *face,
        hair,
        head,
        unclamped,
        resolved: resolved.rect,
        warnings: resolved.warnings,
    })
}

/// Full per-photo pipeline: detect -> validate -> plan -> extract/resize.
pub struct Pipeline {
    pub detector: Box<dyn FaceDetector>,
    pub selector: FaceSelector,
    pub config: CropConfig,
}

impl Pipeline {
    pub fn new(detector: Box<dyn FaceDetector>, selector: FaceSelector, config: CropConfig) -> Self {
        Self {
            detector,
            selector,
            config,
        }
    }

    /// Run detection and geometry without touching pixels.
    pub fn plan(&self, image: &DynamicImage) -> Result<CropPlan, CropError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CropError::unresolvable("source image has zero dimensions"));
        }
        let detections = self.detector.detect(image)?;
        let face = self.selector.select(&detections, width, height)?;
        log::debug!("selected face {:?}", face);
        plan_crop(&face, width, height, &self.config)
    }

    /// Produce the framed output bitmap. Degradations ride along in
    /// [`CropOutcome::warnings`].
    pub fn crop(&self, image: &DynamicImage) -> Result<CropOutcome, CropError> {
        let plan = self.plan(image)?;
        let output = executor::extract_and_resize(
            image,
            &plan.resolved,
            self.config.output_width,
            self.config.output_height,
        );
        Ok(CropOutcome {
            plan,
            image: output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn neutral_config() -> CropConfig {
        let mut config = CropConfig::default();
        config.hair_ratio.top_position_multiplier = 1.0;
        config.hair_ratio.bottom_position_multiplier = 1.0;
        config.hair_ratio.small_face_multiplier = 1.0;
        config.hair_ratio.large_face_multiplier = 1.0;
        config
    }

    #[test]
    fn reference_plan() {
        let face = FaceBox::new(100.0, 80.0, 200.0, 240.0, 0.9);
        let plan = plan_crop(&face, 800, 1000, &neutral_config()).unwrap();
        assert_relative_eq!(plan.hair.allowance_px, 60.0);
        assert_relative_eq!(plan.head.chin_bottom - plan.head.head_top, 328.8, epsilon = 1e-9);
        assert_relative_eq!(plan.unclamped.height, 438.4, epsilon = 1e-9);
        assert_relative_eq!(plan.unclamped.left, 24.64, epsilon = 1e-9);
        assert_relative_eq!(plan.unclamped.top, -15.072, epsilon = 1e-9);
        assert_relative_eq!(plan.resolved.top, 0.0);
        assert!(matches!(plan.warnings[..], [CropWarning::Shifted { .. }]));
    }

    #[test]
    fn default_config_reduces_hair_near_top() {
        // y = 80 < 0.15 * 1000, so the top multiplier (0.6) applies and clamps to min
        let face = FaceBox::new(100.0, 80.0, 200.0, 240.0, 0.9);
        let plan = plan_crop(&face, 800, 1000, &CropConfig::default()).unwrap();
        assert!(plan.hair.near_top);
        assert_relative_eq!(plan.hair.ratio, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn plan_is_idempotent() {
        let face = FaceBox::new(311.0, 207.5, 143.0, 170.0, 0.77);
        let a = plan_crop(&face, 1024, 768, &CropConfig::default()).unwrap();
        let b = plan_crop(&face, 1024, 768, &CropConfig::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
