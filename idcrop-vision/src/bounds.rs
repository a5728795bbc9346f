//! Fit an unclamped crop rectangle inside the source image.
//!
//! Policy: translate when the rectangle fits, otherwise shrink uniformly
//! about the face midpoint and then translate. Every adjustment is reported.

use serde::{Deserialize, Serialize};

use crate::error::CropError;
use crate::geometry::CropRectangle;

/// Containment slack for floating error, in pixels.
const TOLERANCE: f64 = 1e-6;

/// Non-fatal degradation applied while fitting a crop into the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CropWarning {
    /// Rectangle translated by `(dx, dy)` pixels without resizing.
    Shifted { dx: f64, dy: f64 },
    /// Rectangle scaled by `scale` (< 1) to fit the image.
    Shrunk { scale: f64 },
}

impl std::fmt::Display for CropWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shifted { dx, dy } => write!(f, "crop shifted by ({dx:.1}, {dy:.1})px"),
            Self::Shrunk { scale } => write!(f, "crop shrunk to {:.1}% to fit", scale * 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    pub rect: CropRectangle,
    pub warnings: Vec<CropWarning>,
}

/// Resolve `rect` against an `image_width` x `image_height` source.
///
/// `anchor` is the face midpoint; shrinking keeps it at the same relative
/// position inside the frame.
pub fn resolve(
    rect: CropRectangle,
    anchor: (f64, f64),
    image_width: u32,
    image_height: u32,
) -> Result<Resolved, CropError> {
    if image_width == 0 || image_height == 0 {
        return Err(CropError::unresolvable("source image has zero dimensions"));
    }
    if !rect.is_finite() || rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(CropError::unresolvable(format!(
            "invalid crop rectangle {rect:?}"
        )));
    }

    let (w, h) = (image_width as f64, image_height as f64);
    let mut warnings = Vec::new();
    let mut current = rect;

    if current.width > w || current.height > h {
        let aspect = current.aspect();
        let scale = (w / current.width).min(h / current.height);
        // Pin the limiting axis to the image edge exactly
        let (new_width, new_height) = if w / current.width <= h / current.height {
            (w, w / aspect)
        } else {
            (h * aspect, h)
        };
        let (ax, ay) = anchor;
        current = CropRectangle {
            left: ax - (ax - current.left) * scale,
            top: ay - (ay - current.top) * scale,
            width: new_width.min(w),
            height: new_height.min(h),
        };
        log::warn!(
            "crop {:.1}x{:.1} exceeds {}x{} image, shrinking by {:.4}",
            rect.width,
            rect.height,
            image_width,
            image_height,
            scale
        );
        warnings.push(CropWarning::Shrunk { scale });
    }

    let before = current;
    current.left = shift_axis(current.left, current.width, w);
    current.top = shift_axis(current.top, current.height, h);
    let (dx, dy) = (current.left - before.left, current.top - before.top);
    if dx.abs() > TOLERANCE || dy.abs() > TOLERANCE {
        log::debug!("crop shifted by ({:.2}, {:.2})", dx, dy);
        warnings.push(CropWarning::Shifted { dx, dy });
    }

    if !current.is_within(image_width, image_height, TOLERANCE) {
        return Err(CropError::unresolvable(format!(
            "{current:?} still outside {image_width}x{image_height}"
        )));
    }
    if current.width.round() < 1.0 || current.height.round() < 1.0 {
        return Err(CropError::unresolvable(format!(
            "crop collapses below one pixel ({:.3}x{:.3})",
            current.width, current.height
        )));
    }

    Ok(Resolved {
        rect: current,
        warnings,
    })
}

/// Clamp a span starting at `start` of length `len` into `[0, limit]`.
fn shift_axis(start: f64, len: f64, limit: f64) -> f64 {
    if start < 0.0 {
        0.0
    } else if start + len > limit {
        (limit - len).max(0.0)
    } else {
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect(left: f64, top: f64, width: f64, height: f64) -> CropRectangle {
        CropRectangle {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn inside_rect_is_untouched() {
        let r = rect(10.0, 20.0, 80.0, 100.0);
        let resolved = resolve(r, (50.0, 60.0), 200, 200).unwrap();
        assert_eq!(resolved.rect, r);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn reference_crop_shifts_down() {
        let r = rect(24.64, -15.072, 350.72, 438.4);
        let resolved = resolve(r, (200.0, 200.0), 800, 1000).unwrap();
        assert_relative_eq!(resolved.rect.left, 24.64);
        assert_relative_eq!(resolved.rect.top, 0.0);
        assert_eq!(resolved.rect.width, 350.72);
        assert_eq!(resolved.rect.height, 438.4);
        assert_eq!(resolved.warnings.len(), 1);
        match resolved.warnings[0] {
            CropWarning::Shifted { dx, dy } => {
                assert_relative_eq!(dx, 0.0);
                assert_relative_eq!(dy, 15.072, epsilon = 1e-9);
            }
            other => panic!("unexpected warning {other:?}"),
        }
    }

    #[test]
    fn axes_shift_independently() {
        let r = rect(150.0, -30.0, 80.0, 100.0);
        let resolved = resolve(r, (190.0, 20.0), 200, 200).unwrap();
        assert_relative_eq!(resolved.rect.left, 120.0);
        assert_relative_eq!(resolved.rect.top, 0.0);
    }

    #[test]
    fn oversized_rect_shrinks_and_keeps_aspect() {
        let r = rect(-50.0, -40.0, 400.0, 500.0);
        let resolved = resolve(r, (150.0, 160.0), 200, 300).unwrap();
        let out = resolved.rect;
        assert!((out.aspect() - 0.8).abs() < 1e-6);
        assert!(out.is_within(200, 300, 1e-6));
        assert_relative_eq!(out.width, 200.0);
        assert_relative_eq!(out.height, 250.0);
        assert!(matches!(
            resolved.warnings[0],
            CropWarning::Shrunk { scale } if (scale - 0.5).abs() < 1e-12
        ));
    }

    #[test]
    fn shrink_recenters_on_face_midpoint() {
        // Wide image: the height limits, and there is horizontal room left over
        let r = rect(300.0, -100.0, 400.0, 500.0);
        let anchor = (500.0, 150.0);
        let resolved = resolve(r, anchor, 1000, 300).unwrap();
        let out = resolved.rect;

        assert_relative_eq!(out.height, 300.0);
        assert_relative_eq!(out.width, 240.0);
        assert_relative_eq!(out.left + out.width / 2.0, anchor.0, epsilon = 1e-9);

        let before = (anchor.1 - r.top) / r.height;
        let after = (anchor.1 - out.top) / out.height;
        assert_relative_eq!(before, after, epsilon = 1e-9);

        assert_eq!(resolved.warnings.len(), 1);
        assert!(matches!(
            resolved.warnings[0],
            CropWarning::Shrunk { scale } if (scale - 0.6).abs() < 1e-12
        ));
    }

    #[test]
    fn shrink_limited_by_height() {
        let r = rect(0.0, 0.0, 80.0, 1000.0);
        let resolved = resolve(r, (40.0, 500.0), 500, 100).unwrap();
        assert_relative_eq!(resolved.rect.height, 100.0);
        assert_relative_eq!(resolved.rect.width, 8.0);
        assert!(resolved.rect.is_within(500, 100, 1e-9));
    }

    #[test]
    fn zero_sized_image_is_unresolvable() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            resolve(r, (5.0, 5.0), 0, 10),
            Err(CropError::UnresolvableCrop { .. })
        ));
    }

    #[test]
    fn sub_pixel_result_is_unresolvable() {
        // Extremely wide aspect: a 1px-tall image forces width far below a pixel
        let r = rect(0.0, 0.0, 1.0, 1000.0);
        assert!(matches!(
            resolve(r, (0.5, 500.0), 10, 1),
            Err(CropError::UnresolvableCrop { .. })
        ));
    }

    #[test]
    fn containment_holds_for_many_offsets() {
        for i in -20i32..20 {
            for j in -20..20 {
                let grow = i.abs() as f64 * 9.0;
                let r = rect(i as f64 * 37.0, j as f64 * 41.0, 120.0 + grow, 150.0 + grow * 1.25);
                let anchor = (r.left + r.width / 2.0, r.top + r.height / 2.0);
                let resolved = resolve(r, anchor, 300, 240).unwrap();
                assert!(
                    resolved.rect.is_within(300, 240, 1e-6),
                    "{r:?} -> {:?}",
                    resolved.rect
                );
                assert!((resolved.rect.aspect() - r.aspect()).abs() < 1e-6);
            }
        }
    }
}
