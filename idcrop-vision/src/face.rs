use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};

/// YuNet model expects a fixed [1, 3, 640, 640] input.
const DETECTOR_INPUT_SIZE: u32 = 640;

/// Face bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

impl FaceBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Detect faces in an image using the YuNet detector.
///
/// Returned boxes are in source pixel coordinates and may extend past the
/// image edges; normalization happens in [`crate::validate`].
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<FaceBox>> {
    let target_size = DETECTOR_INPUT_SIZE;
    let (orig_width, orig_height) = img.dimensions();
    if orig_width == 0 || orig_height == 0 {
        anyhow::bail!("image has zero dimensions");
    }

    // Letterbox onto a square canvas to avoid distortion
    let max_dim = orig_width.max(orig_height);
    let scale = target_size as f32 / max_dim as f32;
    let new_width = ((orig_width as f32 * scale) as u32).max(1);
    let new_height = ((orig_height as f32 * scale) as u32).max(1);

    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);

    let mut canvas = DynamicImage::new_rgb8(target_size, target_size);
    let offset_x = (target_size - new_width) / 2;
    let offset_y = (target_size - new_height) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    let img_rgb = canvas.to_rgb8();

    // Planar BGR, values in [0, 255]
    let pixel_count = (target_size * target_size) as usize;
    let mut input_data = vec![0.0f32; 3 * pixel_count];
    let (b_channel, rest) = input_data.split_at_mut(pixel_count);
    let (g_channel, r_channel) = rest.split_at_mut(pixel_count);

    for (i, px) in img_rgb.as_raw().chunks_exact(3).enumerate() {
        r_channel[i] = px[0] as f32;
        g_channel[i] = px[1] as f32;
        b_channel[i] = px[2] as f32;
    }

    let input_array = Array4::from_shape_vec(
        (1, 3, target_size as usize, target_size as usize),
        input_data,
    )?;
    let input_tensor = Value::from_array(input_array)?;

    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        output_data.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let output_refs: Vec<(&[i64], &[f32])> = output_data
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let (cls_scores, bbox_preds) =
        yunet::parse_yunet_outputs(&output_refs, target_size as usize)?;

    let raw = yunet::decode_detections(
        cls_scores,
        bbox_preds,
        score_threshold,
        target_size as usize,
    )?;

    // Normalized 640x640 canvas coordinates -> source pixels, minus padding
    let mut detections: Vec<FaceBox> = raw
        .into_iter()
        .map(|d| {
            let to_px = |v: f32| v * target_size as f32;
            let x = (to_px(d.bbox[0]) - offset_x as f32) / scale;
            let y = (to_px(d.bbox[1]) - offset_y as f32) / scale;
            let w = to_px(d.bbox[2]) / scale;
            let h = to_px(d.bbox[3]) / scale;
            FaceBox::new(x as f64, y as f64, w as f64, h as f64, d.score as f64)
        })
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    log::debug!("detector returned {} face(s)", detections.len());
    Ok(detections)
}

/// Apply non-maximum suppression to remove overlapping detections.
pub fn nms(detections: &[FaceBox], iou_threshold: f32) -> Vec<FaceBox> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(sorted[i]);

        for j in (i + 1)..sorted.len() {
            if !suppressed[j] && compute_iou(&sorted[i], &sorted[j]) > iou_threshold as f64 {
                suppressed[j] = true;
            }
        }
    }

    keep
}

pub(crate) fn compute_iou(a: &FaceBox, b: &FaceBox) -> f64 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a.area() + b.area() - inter)
}
