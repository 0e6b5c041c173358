use crate::annotations::detection::{BatchDetectionResult, DetectionResult};
use crate::config::DetectParams;
use crate::error::{DetectError, Result};
use crate::image_utils::letterbox::{GeometricTransform, MODEL_CHANNELS, letterbox_into};
use crate::image_utils::rgba_view::RgbaImageView;
use crate::object_detection::object_detection_model::InferenceBackend;
use crate::object_detection::object_detection_utils::non_maximum_suppression;
use crate::object_detection::yolo_output::decode_output;
use ndarray::{Array4, Axis, Ix3};
use std::time::Instant;
use tracing::{debug, warn};

/// Runs detection on a batch of RGBA images with a single inference call.
///
/// Every image is validated before anything is allocated; the first bad one fails the whole
/// call with `InvalidArgument` naming its index. Each image is letterboxed into its own slice of
/// one `[N, 3, H, W]` tensor, the backend runs once, then every image's slice of the output is
/// decoded with that image's own transform and suppressed independently.
///
/// The result holds exactly one entry per input image, in input order. An output tensor the
/// decoder cannot interpret yields empty entries rather than an error.
pub fn detect_batch<B: InferenceBackend + ?Sized>(
    backend: &mut B,
    images: &[RgbaImageView],
    params: &DetectParams,
) -> Result<BatchDetectionResult> {
    if images.is_empty() {
        return Err(DetectError::invalid("batch contains no images"));
    }
    for (index, image) in images.iter().enumerate() {
        image
            .validate()
            .map_err(|e| DetectError::invalid(format!("image {index}: {e}")))?;
    }

    let batch_size = images.len();
    let descriptor = backend.descriptor();
    let input_width = descriptor.input_width as usize;
    let input_height = descriptor.input_height as usize;
    if input_width == 0 || input_height == 0 {
        return Err(DetectError::invalid(format!(
            "model input size is {input_width}x{input_height}"
        )));
    }

    let start = Instant::now();
    let mut input = allocate_input(batch_size, input_height, input_width)?;
    let transforms: Vec<GeometricTransform> = images
        .iter()
        .enumerate()
        .map(|(i, image)| letterbox_into(image, input.index_axis_mut(Axis(0), i)))
        .collect();
    debug!(
        batch_size,
        input_width,
        input_height,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "preprocessed batch"
    );

    let start = Instant::now();
    let output = backend.run(input)?;
    debug!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        shape = ?output.shape(),
        "inference finished"
    );

    let output = match output.into_dimensionality::<Ix3>() {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "model output is not [batch, features, boxes], returning empty results");
            return Ok(empty_batch(batch_size));
        }
    };
    let (output_batch, num_features, num_boxes) = output.dim();
    if output_batch < batch_size || num_features == 0 || num_boxes == 0 {
        warn!(
            output_batch,
            num_features, num_boxes, batch_size, "unusable model output shape, returning empty results"
        );
        return Ok(empty_batch(batch_size));
    }

    let start = Instant::now();
    let mut results: Vec<DetectionResult> = Vec::with_capacity(batch_size);
    let mut keypoint_allocation_failures = 0_usize;
    for (i, (image, transform)) in images.iter().zip(&transforms).enumerate() {
        let decoded = decode_output(
            output.index_axis(Axis(0), i),
            params,
            transform,
            image.width(),
            image.height(),
        );
        keypoint_allocation_failures += decoded.keypoint_allocation_failures;
        let candidates = decoded.detections.len();
        let kept = non_maximum_suppression(decoded.detections, params.nms_threshold);
        debug!(image = i, candidates, kept = kept.len(), "decoded image");
        results.push(DetectionResult::new(kept));
    }
    debug!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "postprocessed batch"
    );

    Ok(BatchDetectionResult::new(results)
        .with_keypoint_allocation_failures(keypoint_allocation_failures))
}

/// Single-image detection, defined as a batch of one whose only result is moved out.
pub fn detect<B: InferenceBackend + ?Sized>(
    backend: &mut B,
    image: &RgbaImageView,
    params: &DetectParams,
) -> Result<DetectionResult> {
    Ok(detect_batch(backend, std::slice::from_ref(image), params)?.into_single())
}

fn allocate_input(batch_size: usize, height: usize, width: usize) -> Result<Array4<f32>> {
    let len = batch_size
        .checked_mul(MODEL_CHANNELS)
        .and_then(|n| n.checked_mul(height))
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| DetectError::AllocationFailed("input tensor size overflows".to_string()))?;
    let mut buffer: Vec<f32> = Vec::new();
    buffer.try_reserve_exact(len).map_err(|e| {
        DetectError::AllocationFailed(format!("input tensor of {len} floats: {e}"))
    })?;
    buffer.resize(len, 0.0);
    Array4::from_shape_vec((batch_size, MODEL_CHANNELS, height, width), buffer)
        .map_err(|e| DetectError::AllocationFailed(format!("input tensor shape: {e}")))
}

fn empty_batch(batch_size: usize) -> BatchDetectionResult {
    BatchDetectionResult::new(vec![DetectionResult::default(); batch_size])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::object_detection::object_detection_model::ModelDescriptor;
    use ndarray::{Array3, ArrayD, IxDyn};

    /// Returns a canned output and records what it was given.
    struct MockBackend {
        descriptor: ModelDescriptor,
        output: ArrayD<f32>,
        calls: usize,
        last_input_shape: Vec<usize>,
        fail: bool,
    }

    impl MockBackend {
        fn new(output: ArrayD<f32>) -> Self {
            MockBackend {
                descriptor: ModelDescriptor {
                    input_width: 64,
                    input_height: 64,
                    ..Default::default()
                },
                output,
                calls: 0,
                last_input_shape: Vec::new(),
                fail: false,
            }
        }
    }

    impl InferenceBackend for MockBackend {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
            self.calls += 1;
            self.last_input_shape = input.shape().to_vec();
            if self.fail {
                return Err(DetectError::RuntimeFailure("session exploded".to_string()));
            }
            Ok(self.output.clone())
        }
    }

    /// `[batch, 5, boxes]` output with one class: every image sees the same boxes.
    fn single_class_output(batch: usize, boxes: &[[f32; 5]]) -> ArrayD<f32> {
        Array3::from_shape_fn((batch, 5, boxes.len()), |(_, f, b)| boxes[b][f]).into_dyn()
    }

    fn gray(width: u32, height: u32) -> Vec<u8> {
        vec![128_u8; (width * height * 4) as usize]
    }

    #[test]
    fn batch_preserves_order_and_count() {
        let output = single_class_output(2, &[[32.0, 32.0, 16.0, 16.0, 0.9]]);
        let mut backend = MockBackend::new(output);
        let a = gray(64, 64);
        let b = gray(128, 64);
        let images = [RgbaImageView::new(&a, 64, 64), RgbaImageView::new(&b, 128, 64)];

        let batch = detect_batch(&mut backend, &images, &DetectParams::default()).unwrap();

        assert_eq!(backend.calls, 1);
        assert_eq!(backend.last_input_shape, vec![2, 3, 64, 64]);
        assert_eq!(batch.len(), 2);
        // Square image: identity transform.
        let first = &batch.results()[0].detections[0];
        assert!((first.x - 0.5).abs() < 1e-6 && (first.width - 0.25).abs() < 1e-6);
        // 128x64 image: scale 0.5, 16 px of padding on top. The same model box covers half
        // the image height once mapped back.
        let second = &batch.results()[1].detections[0];
        assert!((second.x - 0.5).abs() < 1e-6);
        assert!((second.y - 0.5).abs() < 1e-6);
        assert!((second.width - 0.25).abs() < 1e-6);
        assert!((second.height - 0.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_image_fails_before_inference() {
        let mut backend = MockBackend::new(single_class_output(3, &[[1.0, 1.0, 1.0, 1.0, 0.9]]));
        let good = gray(8, 8);
        let short = vec![0_u8; 10];
        let images = [
            RgbaImageView::new(&good, 8, 8),
            RgbaImageView::new(&short, 8, 8),
            RgbaImageView::new(&good, 8, 8),
        ];

        let err = detect_batch(&mut backend, &images, &DetectParams::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("image 1"));
        assert_eq!(backend.calls, 0);
    }

    #[test]
    fn zero_model_input_size_is_rejected() {
        let data = gray(16, 16);
        let image = RgbaImageView::new(&data, 16, 16);
        for (width, height) in [(0, 0), (0, 64), (64, 0)] {
            let mut backend =
                MockBackend::new(single_class_output(1, &[[8.0, 8.0, 4.0, 4.0, 0.9]]));
            backend.descriptor.input_width = width;
            backend.descriptor.input_height = height;

            let err = detect(&mut backend, &image, &DetectParams::default()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
            assert!(err.to_string().contains("model input size"));
            assert_eq!(backend.calls, 0);
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut backend = MockBackend::new(single_class_output(1, &[[1.0, 1.0, 1.0, 1.0, 0.9]]));
        let err = detect_batch(&mut backend, &[], &DetectParams::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(backend.calls, 0);
    }

    #[test]
    fn single_matches_batch_of_one() {
        let boxes = [
            [20.0, 20.0, 10.0, 10.0, 0.8],
            [21.0, 20.0, 10.0, 10.0, 0.7],
            [50.0, 50.0, 8.0, 8.0, 0.6],
            [10.0, 50.0, 8.0, 8.0, 0.1],
        ];
        let data = gray(64, 48);
        let image = RgbaImageView::new(&data, 64, 48);
        let params = DetectParams::default();

        let mut backend = MockBackend::new(single_class_output(1, &boxes));
        let single = detect(&mut backend, &image, &params).unwrap();
        let batch = detect_batch(&mut backend, &[image], &params).unwrap();

        assert_eq!(single.len(), 2);
        assert_eq!(&single, &batch.results()[0]);
    }

    #[test]
    fn unusable_output_gives_empty_results() {
        let data = gray(16, 16);
        let images = [RgbaImageView::new(&data, 16, 16), RgbaImageView::new(&data, 16, 16)];
        let params = DetectParams::default();

        // Wrong rank.
        let mut backend = MockBackend::new(ArrayD::zeros(IxDyn(&[2, 5])));
        let batch = detect_batch(&mut backend, &images, &params).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.results().iter().all(|r| r.is_empty()));

        // Fewer images in the output than in the request.
        let mut backend = MockBackend::new(single_class_output(1, &[[8.0, 8.0, 4.0, 4.0, 0.9]]));
        let batch = detect_batch(&mut backend, &images, &params).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.results().iter().all(|r| r.is_empty()));

        // No boxes.
        let mut backend = MockBackend::new(ArrayD::zeros(IxDyn(&[2, 5, 0])));
        let batch = detect_batch(&mut backend, &images, &params).unwrap();
        assert!(batch.results().iter().all(|r| r.is_empty()));
    }

    #[test]
    fn backend_failure_propagates() {
        let mut backend = MockBackend::new(single_class_output(1, &[[8.0, 8.0, 4.0, 4.0, 0.9]]));
        backend.fail = true;
        let data = gray(16, 16);
        let err = detect(&mut backend, &RgbaImageView::new(&data, 16, 16), &DetectParams::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RuntimeFailure);
        assert_eq!(backend.calls, 1);
    }

    #[test]
    fn results_are_sorted_and_suppressed_per_image() {
        let boxes = [
            [32.0, 32.0, 20.0, 20.0, 0.5],
            [32.0, 32.0, 20.0, 20.0, 0.95],
            [33.0, 32.0, 20.0, 20.0, 0.7],
            [5.0, 5.0, 4.0, 4.0, 0.6],
        ];
        let mut backend = MockBackend::new(single_class_output(1, &boxes));
        let data = gray(64, 64);
        let result = detect(
            &mut backend,
            &RgbaImageView::new(&data, 64, 64),
            &DetectParams::new(0.25, 0.45),
        )
        .unwrap();
        let confidences: Vec<f32> = result.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.6]);
    }
}
