//! Debug rendering of a crop plan over its source image.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::pipeline::CropPlan;

const FACE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CROP_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const HEAD_TOP_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const CHIN_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

/// Stroke width, in pixels, of every outline.
const STROKE: i32 = 2;

fn draw_box(canvas: &mut RgbImage, left: f64, top: f64, width: f64, height: f64, color: Rgb<u8>) {
    for inset in 0..STROKE {
        let w = width.round() as i32 - 2 * inset;
        let h = height.round() as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(left.round() as i32 + inset, top.round() as i32 + inset)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn draw_hline(canvas: &mut RgbImage, x0: f64, x1: f64, y: f64, color: Rgb<u8>) {
    for offset in 0..STROKE {
        let y = y as f32 + offset as f32;
        draw_line_segment_mut(canvas, (x0 as f32, y), (x1 as f32, y), color);
    }
}

/// Face box in green, resolved crop in blue, head-top line in red, chin line
/// in yellow and the face midpoint in magenta.
pub fn render(source: &DynamicImage, plan: &CropPlan) -> RgbImage {
    let mut canvas = source.to_rgb8();
    let face = &plan.face;

    draw_box(&mut canvas, face.x, face.y, face.width, face.height, FACE_COLOR);
    let crop = &plan.resolved;
    draw_box(&mut canvas, crop.left, crop.top, crop.width, crop.height, CROP_COLOR);

    let (x0, x1) = (face.x - 10.0, face.right() + 10.0);
    draw_hline(&mut canvas, x0, x1, plan.head.head_top, HEAD_TOP_COLOR);
    draw_hline(&mut canvas, x0, x1, plan.head.chin_bottom, CHIN_COLOR);

    draw_filled_circle_mut(
        &mut canvas,
        (face.center_x() as i32, face.center_y() as i32),
        5,
        CENTER_COLOR,
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CropConfig;
    use crate::pipeline::plan_crop;
    use crate::FaceBox;

    #[test]
    fn marks_face_and_crop() {
        let source = DynamicImage::new_rgb8(400, 500);
        let face = FaceBox::new(150.0, 200.0, 100.0, 120.0, 0.9);
        let plan = plan_crop(&face, 400, 500, &CropConfig::default()).unwrap();
        let canvas = render(&source, &plan);

        assert_eq!(canvas.dimensions(), (400, 500));
        assert_eq!(*canvas.get_pixel(150, 250), FACE_COLOR);
        let (cx, cy) = (
            plan.resolved.left.round() as u32,
            plan.resolved.top.round() as u32 + 5,
        );
        assert_eq!(*canvas.get_pixel(cx, cy), CROP_COLOR);
    }
}
