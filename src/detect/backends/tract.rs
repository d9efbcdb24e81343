#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection};

const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output of shape `[1, 4 + classes, anchors]` with boxes as
/// `cx, cy, w, h` in model input pixels. Loads the model from local disk only.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    capability: DetectionCapability,
    input_size: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        capability: DetectionCapability,
        input_size: u32,
        labels: Vec<String>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        if labels.is_empty() {
            return Err(anyhow!(
                "model {} needs at least one class label",
                model_path.display()
            ));
        }

        Ok(Self {
            model,
            capability,
            input_size,
            labels,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = imageops::resize(image, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        image_width: u32,
        image_height: u32,
        min_confidence: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not three-dimensional")?;
        let classes = shape[1] - 4;
        let anchors = shape[2];
        let scale_x = image_width as f32 / self.input_size as f32;
        let scale_y = image_height as f32 / self.input_size as f32;

        let mut candidates: Vec<(usize, Detection)> = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..classes {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score < min_confidence {
                continue;
            }

            let cx = view[[0, 0, anchor]];
            let cy = view[[0, 1, anchor]];
            let w = view[[0, 2, anchor]];
            let h = view[[0, 3, anchor]];
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_x).floor() as i32,
                ((cy - h / 2.0) * scale_y).floor() as i32,
                ((cx + w / 2.0) * scale_x).ceil() as i32,
                ((cy + h / 2.0) * scale_y).ceil() as i32,
            )
            .clip_to(image_width, image_height);
            if bbox.is_empty() {
                continue;
            }
            let label = self
                .labels
                .get(best_class)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", best_class));
            candidates.push((best_class, Detection::new(label, best_score, bbox)));
        }

        Ok(non_max_suppression(candidates))
    }
}

fn non_max_suppression(mut candidates: Vec<(usize, Detection)>) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (class, detection) in candidates {
        let suppressed = kept.iter().any(|(kept_class, kept_detection)| {
            *kept_class == class && iou(&kept_detection.bbox, &detection.bbox) >= NMS_IOU_THRESHOLD
        });
        if !suppressed {
            kept.push((class, detection));
        }
    }
    kept.into_iter().map(|(_, detection)| detection).collect()
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = BoundingBox::new(a.x1.max(b.x1), a.y1.max(b.y1), a.x2.min(b.x2), a.y2.min(b.y2));
    let area = |bbox: &BoundingBox| bbox.width() as f32 * bbox.height() as f32;
    let intersection = area(&inter);
    let union = area(a) + area(b) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        match self.capability {
            DetectionCapability::Vehicle => "tract-vehicle",
            DetectionCapability::Character => "tract-character",
        }
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.capability
    }

    fn detect(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<Detection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, image.width(), image.height(), min_confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank, 1.0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_drops_overlapping_boxes_of_same_class() {
        let candidates = vec![
            (0, Detection::new("car", 0.6, BoundingBox::new(0, 0, 100, 100))),
            (0, Detection::new("car", 0.9, BoundingBox::new(5, 5, 105, 105))),
            (1, Detection::new("bus", 0.5, BoundingBox::new(0, 0, 100, 100))),
        ];
        let kept = non_max_suppression(candidates);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label, "bus");
    }
}
