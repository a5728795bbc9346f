//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: for each stride (8, 16, 32) it emits per-cell
//! `cls`, `obj`, `bbox` and `kps` tensors. Boxes decode straight from the grid:
//! cx = (grid_x + dx) * stride / input_size
//! cy = (grid_y + dy) * stride / input_size
//! w = exp(dw) * stride / input_size
//! h = exp(dh) * stride / input_size
//!
//! `cls` and `obj` are already probabilities; their product is the score.
//! Landmarks are not needed for cropping and are skipped.

use anyhow::Result;
use ndarray::Array2;

const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
}

/// Decode per-stride score and box tensors into normalized boxes.
pub fn decode_detections(
    cls_scores: Vec<Array2<f32>>,
    bbox_preds: Vec<Array2<f32>>,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();

    for (scale_idx, &stride) in STRIDES.iter().enumerate() {
        let (Some(scores), Some(bboxes)) = (cls_scores.get(scale_idx), bbox_preds.get(scale_idx))
        else {
            anyhow::bail!("missing tensors for stride {}", stride);
        };

        let feature_size = input_size / stride;
        let num_boxes = scores.shape()[0];
        if num_boxes != feature_size * feature_size {
            anyhow::bail!(
                "Expected {} boxes for stride {} ({}x{} grid), got {}",
                feature_size * feature_size,
                stride,
                feature_size,
                feature_size,
                num_boxes
            );
        }

        for i in 0..feature_size {
            for j in 0..feature_size {
                let idx = i * feature_size + j;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let dx = bboxes[[idx, 0]];
                let dy = bboxes[[idx, 1]];
                let dw = bboxes[[idx, 2]].exp();
                let dh = bboxes[[idx, 3]].exp();

                let stride_f = stride as f32;
                let size_f = input_size as f32;
                let cx = (j as f32 + dx) * stride_f / size_f;
                let cy = (i as f32 + dy) * stride_f / size_f;
                let w = dw * stride_f / size_f;
                let h = dh * stride_f / size_f;

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                });
            }
        }
    }

    Ok(detections)
}

/// Split YuNet's twelve raw outputs into combined scores and box deltas.
///
/// Output order: cls_8, cls_16, cls_32, obj_8, obj_16, obj_32,
/// bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32.
pub fn parse_yunet_outputs(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
) -> Result<(Vec<Array2<f32>>, Vec<Array2<f32>>)> {
    let expected_counts: Vec<usize> = STRIDES
        .iter()
        .map(|s| (input_size / s) * (input_size / s))
        .collect();

    let cls = read_group(outputs, 0, 1, &expected_counts, "cls")?;
    let obj = read_group(outputs, 3, 1, &expected_counts, "obj")?;
    let bbox = read_group(outputs, 6, 4, &expected_counts, "bbox")?;

    let scores = cls.iter().zip(obj.iter()).map(|(c, o)| c * o).collect();
    Ok((scores, bbox))
}

fn read_group(
    outputs: &[(&[i64], &[f32])],
    first_index: usize,
    channels: usize,
    expected_counts: &[usize],
    label: &str,
) -> Result<Vec<Array2<f32>>> {
    let mut group = Vec::with_capacity(expected_counts.len());
    for (offset, &expected_count) in expected_counts.iter().enumerate() {
        let idx = first_index + offset;
        let Some((shape, data)) = outputs.get(idx) else {
            anyhow::bail!("Missing {} output at index {}", label, idx);
        };
        if shape.len() != 3
            || shape[0] != 1
            || shape[1] as usize != expected_count
            || shape[2] as usize != channels
        {
            anyhow::bail!(
                "Unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
                label,
                idx,
                shape,
                expected_count,
                channels
            );
        }
        group.push(Array2::from_shape_vec(
            (expected_count, channels),
            data.to_vec(),
        )?);
    }
    Ok(group)
}
