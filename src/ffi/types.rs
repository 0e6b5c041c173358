//! C layouts of the detection results and the rules for handing them across the boundary.
//!
//! Every array reachable from an envelope is a boxed slice whose length is stored next to its
//! pointer, so it can be rebuilt and dropped exactly once. Empty arrays are null pointers.

use crate::annotations::detection::{BatchDetectionResult, Detection, DetectionResult};
use crate::error::{DetectError, Result};
use crate::object_detection::accelerator::GpuReport;
use crate::object_detection::yolo_output::KEYPOINT_FEATURES;
use std::ffi::{c_char, c_int};
use std::ptr;
use tracing::warn;

pub const DEVICE_NAME_LEN: usize = 256;

#[repr(C)]
#[derive(Debug)]
pub struct FfiDetection {
    pub class_id: c_int,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// `num_keypoints` triples of (x, y, visibility).
    pub keypoints: *mut f32,
    pub num_keypoints: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct FfiDetectionResult {
    pub detections: *mut FfiDetection,
    pub count: c_int,
    pub capacity: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct FfiBatchDetectionResult {
    pub results: *mut FfiDetectionResult,
    pub num_images: c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct GpuInfo {
    pub cuda_available: bool,
    pub tensorrt_available: bool,
    pub coreml_available: bool,
    pub directml_available: bool,
    pub device_name: [c_char; DEVICE_NAME_LEN],
    pub cuda_device_count: c_int,
}

impl From<&GpuReport> for GpuInfo {
    fn from(report: &GpuReport) -> Self {
        let mut device_name = [0 as c_char; DEVICE_NAME_LEN];
        for (dst, &src) in device_name
            .iter_mut()
            .zip(report.device_name.as_bytes().iter().take(DEVICE_NAME_LEN - 1))
        {
            *dst = src as c_char;
        }
        GpuInfo {
            cuda_available: report.cuda_available,
            tensorrt_available: report.tensorrt_available,
            coreml_available: report.coreml_available,
            directml_available: report.directml_available,
            device_name,
            cuda_device_count: report.cuda_device_count,
        }
    }
}

/// Allocation failures met while converting; the envelope stays valid, the affected items are
/// left empty.
#[derive(Debug, Default)]
pub struct Degradation {
    pub keypoint_failures: usize,
    pub detection_failures: usize,
}

impl Degradation {
    pub fn is_degraded(&self) -> bool {
        self.keypoint_failures > 0 || self.detection_failures > 0
    }

    pub fn to_error(&self) -> Option<DetectError> {
        if !self.is_degraded() {
            return None;
        }
        Some(DetectError::AllocationFailed(format!(
            "{} image result(s) and {} keypoint array(s) could not be allocated",
            self.detection_failures, self.keypoint_failures
        )))
    }
}

fn to_c_int(value: usize) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

/// Moves a vector into a leaked boxed slice. Empty vectors become null.
fn leak_slice<T>(items: Vec<T>) -> *mut T {
    if items.is_empty() {
        return ptr::null_mut();
    }
    Box::into_raw(items.into_boxed_slice()) as *mut T
}

/// Rebuilds and drops a slice produced by [`leak_slice`].
///
/// # Safety
/// `data` must be null or come from `leak_slice` with exactly `len` elements, and must not be
/// used afterwards.
unsafe fn drop_slice<T>(data: *mut T, len: usize) {
    if data.is_null() || len == 0 {
        return;
    }
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)) });
}

fn convert_detection(detection: Detection, degradation: &mut Degradation) -> FfiDetection {
    let mut flat: Vec<f32> = Vec::new();
    let wanted = detection.keypoints.len() * KEYPOINT_FEATURES;
    let num_keypoints = if wanted > 0 && flat.try_reserve_exact(wanted).is_err() {
        warn!(keypoints = detection.keypoints.len(), "failed to allocate keypoint array");
        degradation.keypoint_failures += 1;
        0
    } else {
        for kp in &detection.keypoints {
            flat.extend_from_slice(&[kp.x, kp.y, kp.visibility]);
        }
        detection.keypoints.len()
    };
    FfiDetection {
        class_id: c_int::try_from(detection.class_id).unwrap_or(c_int::MAX),
        confidence: detection.confidence,
        x: detection.x,
        y: detection.y,
        width: detection.width,
        height: detection.height,
        keypoints: leak_slice(flat),
        num_keypoints: to_c_int(num_keypoints),
    }
}

fn convert_result(result: DetectionResult, degradation: &mut Degradation) -> FfiDetectionResult {
    let mut detections: Vec<FfiDetection> = Vec::new();
    if detections.try_reserve_exact(result.len()).is_err() {
        warn!(count = result.len(), "failed to allocate detection array, returning it empty");
        degradation.detection_failures += 1;
        return FfiDetectionResult::empty();
    }
    detections.extend(
        result
            .into_iter()
            .map(|detection| convert_detection(detection, degradation)),
    );
    let count = to_c_int(detections.len());
    FfiDetectionResult {
        detections: leak_slice(detections),
        count,
        capacity: count,
    }
}

impl FfiDetectionResult {
    pub fn empty() -> Self {
        FfiDetectionResult {
            detections: ptr::null_mut(),
            count: 0,
            capacity: 0,
        }
    }

    /// Releases the detection array and every keypoint array, leaving `self` empty.
    ///
    /// # Safety
    /// `self` must have been produced by this module and not released before.
    pub unsafe fn release(&mut self) {
        if !self.detections.is_null() {
            let len = self.count.max(0) as usize;
            for i in 0..len {
                let det = unsafe { &mut *self.detections.add(i) };
                let kp_len = det.num_keypoints.max(0) as usize * KEYPOINT_FEATURES;
                unsafe { drop_slice(det.keypoints, kp_len) };
                det.keypoints = ptr::null_mut();
                det.num_keypoints = 0;
            }
            unsafe { drop_slice(self.detections, len) };
        }
        *self = FfiDetectionResult::empty();
    }
}

/// Converts a native batch into a heap envelope owned by the caller.
///
/// Fails only when the per-image result array itself cannot be allocated. Smaller failures
/// are counted in the returned [`Degradation`] and leave the affected entries empty.
pub fn into_raw_batch(
    batch: BatchDetectionResult,
) -> Result<(*mut FfiBatchDetectionResult, Degradation)> {
    let mut degradation = Degradation {
        keypoint_failures: batch.keypoint_allocation_failures(),
        detection_failures: 0,
    };
    let results = batch.into_results();
    let mut converted: Vec<FfiDetectionResult> = Vec::new();
    converted.try_reserve_exact(results.len()).map_err(|e| {
        DetectError::AllocationFailed(format!("result array of {} images: {e}", results.len()))
    })?;
    converted.extend(
        results
            .into_iter()
            .map(|result| convert_result(result, &mut degradation)),
    );
    let num_images = to_c_int(converted.len());
    let envelope = Box::new(FfiBatchDetectionResult {
        results: leak_slice(converted),
        num_images,
    });
    Ok((Box::into_raw(envelope), degradation))
}

/// Moves the first image's detections out of a batch envelope into a fresh single envelope,
/// then frees the batch.
///
/// The source slot is emptied before the batch is released, so the detections are owned by
/// exactly one envelope at every point. A batch with no images yields an empty result.
///
/// # Safety
/// `batch` must be a live pointer from [`into_raw_batch`]; it is consumed.
pub unsafe fn take_first(batch: *mut FfiBatchDetectionResult) -> *mut FfiDetectionResult {
    let mut single = FfiDetectionResult::empty();
    if !batch.is_null() {
        let envelope = unsafe { &mut *batch };
        if !envelope.results.is_null() && envelope.num_images > 0 {
            let slot = unsafe { &mut *envelope.results };
            single = FfiDetectionResult {
                detections: slot.detections,
                count: slot.count,
                capacity: slot.capacity,
            };
            slot.detections = ptr::null_mut();
            slot.count = 0;
            slot.capacity = 0;
        }
        unsafe { free_batch(batch) };
    }
    Box::into_raw(Box::new(single))
}

/// # Safety
/// `result` must be null or a live pointer from this module; it is consumed.
pub unsafe fn free_result(result: *mut FfiDetectionResult) {
    if result.is_null() {
        return;
    }
    let mut envelope = unsafe { Box::from_raw(result) };
    unsafe { envelope.release() };
}

/// # Safety
/// `batch` must be null or a live pointer from [`into_raw_batch`]; it is consumed.
pub unsafe fn free_batch(batch: *mut FfiBatchDetectionResult) {
    if batch.is_null() {
        return;
    }
    let envelope = unsafe { Box::from_raw(batch) };
    let len = envelope.num_images.max(0) as usize;
    if !envelope.results.is_null() {
        for i in 0..len {
            unsafe { (*envelope.results.add(i)).release() };
        }
        unsafe { drop_slice(envelope.results, len) };
    }
}
