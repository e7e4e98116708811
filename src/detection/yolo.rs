// src/detection/yolo.rs
//
// ONNX Runtime YOLO detector: letterbox preprocess, single-tensor inference,
// [1, 84, N] postprocess with class filtering and greedy NMS. The confidence
// floor is applied here, before track association — detections below it
// never reach the tracker.

use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::types::Frame;

const YOLO_CLASSES: usize = 80;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// One raw detector output box, before track association.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: u32,
}

impl RawDetection {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }
}

pub struct YoloDetector {
    session: Session,
    input_size: usize,
    classes: Vec<u32>,
    confidence_floor: f32,
}

impl YoloDetector {
    pub fn new(
        model_path: &str,
        input_size: usize,
        classes: Vec<u32>,
        confidence_floor: f32,
    ) -> Result<Self, PipelineError> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()
            .and_then(|b| {
                b.with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])
            })
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| PipelineError::Engine(format!("session init failed: {}", e)))?;

        info!("✓ YOLO detector initialized");
        Ok(Self {
            session,
            input_size,
            classes,
            confidence_floor,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, PipelineError> {
        let (input, scale, pad_x, pad_y) = self.preprocess(&frame.data, frame.width, frame.height);
        let output = self.infer(&input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);

        debug!(
            "frame {}: {} detections above floor {:.2}",
            frame.index,
            detections.len(),
            self.confidence_floor
        );
        Ok(detections)
    }

    /// Letterbox into a square canvas, normalize to [0,1], HWC -> CHW.
    fn preprocess(&self, src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
        let target = self.input_size;

        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;

        let pad_x = (target - scaled_w) as f32 / 2.0;
        let pad_y = (target - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

        // Gray canvas, resized image centered
        let mut canvas = vec![114u8; target * target * 3];
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_x = x + pad_x as usize;
                let dst_y = y + pad_y as usize;
                let dst_idx = (dst_y * target + dst_x) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        let mut input = vec![0.0f32; 3 * target * target];
        for c in 0..3 {
            for h in 0..target {
                for w in 0..target {
                    let hwc_idx = (h * target + w) * 3 + c;
                    let chw_idx = c * target * target + h * target + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, PipelineError> {
        let shape = [1usize, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))
                .map_err(|e| PipelineError::Engine(format!("input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs!["images" => input_value])
            .map_err(|e| PipelineError::Engine(format!("inference failed: {}", e)))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Engine(format!("output tensor: {}", e)))?;

        Ok(data.to_vec())
    }

    fn postprocess(&self, output: &[f32], scale: f32, pad_x: f32, pad_y: f32) -> Vec<RawDetection> {
        let detections = decode_output(
            output,
            &self.classes,
            self.confidence_floor,
            scale,
            pad_x,
            pad_y,
        );
        nms(detections, NMS_IOU_THRESHOLD)
    }
}

/// Parse the raw output tensor and apply the class filter and confidence
/// floor. Boxes that fail either never reach NMS or the tracker.
///
/// Output layout: [1, 4 + classes, N] — bbox rows then one confidence row
/// per class.
fn decode_output(
    output: &[f32],
    classes: &[u32],
    confidence_floor: f32,
    scale: f32,
    pad_x: f32,
    pad_y: f32,
) -> Vec<RawDetection> {
    let num_preds = output.len() / (4 + YOLO_CLASSES);
    let mut detections = Vec::new();

    for i in 0..num_preds {
        let cx = output[i];
        let cy = output[num_preds + i];
        let w = output[num_preds * 2 + i];
        let h = output[num_preds * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0u32;
        for c in 0..YOLO_CLASSES {
            let conf = output[num_preds * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c as u32;
            }
        }

        if max_conf < confidence_floor || !classes.contains(&best_class) {
            continue;
        }

        // Center format -> corners, then reverse the letterbox transform
        let x1 = (cx - w / 2.0 - pad_x) / scale;
        let y1 = (cy - h / 2.0 - pad_y) / scale;
        let x2 = (cx + w / 2.0 - pad_x) / scale;
        let y2 = (cy + h / 2.0 - pad_y) / scale;

        detections.push(RawDetection {
            bbox: [x1, y1, x2, y2],
            confidence: max_conf,
            class_id: best_class,
        });
    }

    detections
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }

    keep
}

pub(crate) fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
