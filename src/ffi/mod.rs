//! C ABI.
//!
//! Handles and result envelopes are heap objects owned by the caller until they are passed
//! back to the matching `onnx_unload_model` / `onnx_free_*` function. A model handle must not be
//! used from two threads at once. Every entry point except the two last-error getters resets
//! the calling thread's last error, and no panic is allowed to unwind into C.

pub mod last_error;
pub mod types;

use crate::annotations::detection::BatchDetectionResult;
use crate::config::{DetectParams, ModelKind};
use crate::error::{DetectError, ErrorCode, Result};
use crate::image_utils::rgba_view::RgbaImageView;
use crate::object_detection::accelerator;
use crate::object_detection::runtime::{Model, Runtime};
use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::slice;
use tracing::warn;
use types::{FfiBatchDetectionResult, FfiDetectionResult, GpuInfo};

/// Opaque model pointer handed to C.
pub type ModelHandle = *mut c_void;

static RUNTIME: Runtime = Runtime::new();

#[cfg(feature = "onnxruntime")]
const VERSION: &CStr = match CStr::from_bytes_with_nul(
    concat!(env!("CARGO_PKG_VERSION"), "-yolov8\0").as_bytes(),
) {
    Ok(version) => version,
    Err(_) => c"unknown",
};

#[cfg(not(feature = "onnxruntime"))]
const VERSION: &CStr = c"unavailable";

thread_local! {
    static PROVIDERS: RefCell<CString> = RefCell::new(CString::default());
}

/// Runs `f` with the last error cleared, turning a panic into `Unknown` and `fallback`.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    last_error::clear();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            last_error::set(ErrorCode::Unknown, "internal panic in onnx-detect");
            fallback
        }
    }
}

/// Records `err` in the last-error slot and returns `fallback`.
fn report<T>(result: Result<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            last_error::set_error(&err);
            fallback
        }
    }
}

/// Boxes a model into a C handle. `onnx_unload_model` releases it.
///
/// This is how `onnx_load_model` builds its handles; it is public so a host that builds its own
/// [`Model`] (custom backend, preloaded session) can drive it through the same C functions.
pub fn model_handle_from(model: Model) -> ModelHandle {
    Box::into_raw(Box::new(model)) as ModelHandle
}

/// # Safety
/// `handle` must be null or a live handle from [`model_handle_from`].
unsafe fn model_from_handle<'a>(handle: ModelHandle) -> Result<&'a mut Model> {
    match unsafe { (handle as *mut Model).as_mut() } {
        Some(model) => Ok(model),
        None if cfg!(feature = "onnxruntime") => Err(DetectError::invalid("model handle is null")),
        None => Err(DetectError::RuntimeNotFound),
    }
}

fn dimension(value: c_int, what: &str, index: usize) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 1)
        .ok_or_else(|| DetectError::invalid(format!("image {index}: invalid {what} {value}")))
}

/// Borrows one caller image after checking its geometry.
///
/// # Safety
/// `data` must be null or point to at least `width * height * 4` readable bytes that stay
/// valid for `'a`.
unsafe fn image_view<'a>(
    data: *const u8,
    width: c_int,
    height: c_int,
    index: usize,
) -> Result<RgbaImageView<'a>> {
    if data.is_null() {
        return Err(DetectError::invalid(format!("image {index}: data is null")));
    }
    let width = dimension(width, "width", index)?;
    let height = dimension(height, "height", index)?;
    let len = RgbaImageView::required_len(width, height).ok_or_else(|| {
        DetectError::invalid(format!("image {index}: {width} x {height} is too large"))
    })?;
    let bytes = unsafe { slice::from_raw_parts(data, len) };
    Ok(RgbaImageView::new(bytes, width, height))
}

fn params_from_raw(
    conf_threshold: f32,
    nms_threshold: f32,
    model_type: c_int,
    num_keypoints: c_int,
) -> DetectParams {
    DetectParams {
        confidence_threshold: conf_threshold,
        nms_threshold,
        model_kind: ModelKind::from_raw(model_type),
        num_keypoints: usize::try_from(num_keypoints).unwrap_or(0),
    }
}

/// Converts a native batch into its envelope and reports any partial allocation failure.
fn hand_out_batch(batch: BatchDetectionResult) -> Result<*mut FfiBatchDetectionResult> {
    let (raw, degradation) = types::into_raw_batch(batch)?;
    if let Some(err) = degradation.to_error() {
        warn!(error = %err, "returning a degraded result");
        last_error::set_error(&err);
    }
    Ok(raw)
}

/// # Safety
/// See [`onnx_detect_batch`].
unsafe fn detect_batch_raw(
    handle: ModelHandle,
    image_data_list: *const *const u8,
    num_images: c_int,
    image_widths: *const c_int,
    image_heights: *const c_int,
    params: &DetectParams,
) -> Result<*mut FfiBatchDetectionResult> {
    let model = unsafe { model_from_handle(handle) }?;
    if image_data_list.is_null() {
        return Err(DetectError::invalid("image list is null"));
    }
    let num_images = usize::try_from(num_images)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| DetectError::invalid(format!("invalid image count {num_images}")))?;
    if image_widths.is_null() || image_heights.is_null() {
        return Err(DetectError::invalid("size arrays are null"));
    }

    let data = unsafe { slice::from_raw_parts(image_data_list, num_images) };
    let widths = unsafe { slice::from_raw_parts(image_widths, num_images) };
    let heights = unsafe { slice::from_raw_parts(image_heights, num_images) };
    let images: Vec<RgbaImageView> = data
        .iter()
        .zip(widths)
        .zip(heights)
        .enumerate()
        .map(|(i, ((&image, &width), &height))| unsafe { image_view(image, width, height, i) })
        .collect::<Result<_>>()?;

    let batch = model.detect_batch(&images, params)?;
    hand_out_batch(batch)
}

/// Initializes the process-wide runtime. Idempotent.
#[unsafe(no_mangle)]
pub extern "C" fn onnx_init() -> bool {
    guarded(false, || report(RUNTIME.open().map(|_| true), false))
}

/// Closes the process-wide runtime. Loaded handles stay usable until unloaded.
#[unsafe(no_mangle)]
pub extern "C" fn onnx_cleanup() {
    guarded((), || RUNTIME.close())
}

/// Loads a model, opening the runtime first if needed. Returns null on failure.
///
/// # Safety
/// `model_path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn onnx_load_model(model_path: *const c_char, use_gpu: bool) -> ModelHandle {
    guarded(ptr::null_mut(), || {
        let load = || -> Result<ModelHandle> {
            RUNTIME.open()?;
            if model_path.is_null() {
                return Err(DetectError::invalid("model path is null"));
            }
            let path = unsafe { CStr::from_ptr(model_path) }
                .to_str()
                .map_err(|e| DetectError::invalid(format!("model path is not UTF-8: {e}")))?;
            let model = RUNTIME.load_model(Path::new(path), use_gpu)?;
            Ok(model_handle_from(model))
        };
        report(load(), ptr::null_mut())
    })
}

/// Releases a model handle. Null is a no-op.
///
/// # Safety
/// `handle` must be null or a live handle; it must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn onnx_unload_model(handle: ModelHandle) {
    guarded((), || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle as *mut Model) });
        }
    })
}

/// Writes the model input size. A null handle writes 0 x 0 and fails.
///
/// # Safety
/// `handle` must be null or live; `width` and `height` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn onnx_get_input_size(
    handle: ModelHandle,
    width: *mut c_int,
    height: *mut c_int,
) -> bool {
    guarded(false, || {
        if width.is_null() || height.is_null() {
            last_error::set_error(&DetectError::invalid("output pointers are null"));
            return false;
        }
        match unsafe { model_from_handle(handle) } {
            Ok(model) => {
                let (w, h) = model.input_size();
                unsafe {
                    *width = c_int::try_from(w).unwrap_or(c_int::MAX);
                    *height = c_int::try_from(h).unwrap_or(c_int::MAX);
                }
                true
            }
            Err(err) => {
                unsafe {
                    *width = 0;
                    *height = 0;
                }
                last_error::set_error(&err);
                false
            }
        }
    })
}

/// Detects objects in one RGBA image. Release the result with `onnx_free_result`.
///
/// # Safety
/// `handle` must be null or live; `image_data` must be null or hold
/// `image_width * image_height * 4` bytes.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn onnx_detect(
    handle: ModelHandle,
    image_data: *const u8,
    image_width: c_int,
    image_height: c_int,
    conf_threshold: f32,
    nms_threshold: f32,
    model_type: c_int,
    num_keypoints: c_int,
) -> *mut FfiDetectionResult {
    guarded(ptr::null_mut(), || {
        let params = params_from_raw(conf_threshold, nms_threshold, model_type, num_keypoints);
        let detect = || -> Result<*mut FfiDetectionResult> {
            // Validated here too so the error names the single image, not a batch slot.
            unsafe { image_view(image_data, image_width, image_height, 0) }?;
            let data = [image_data];
            let widths = [image_width];
            let heights = [image_height];
            let batch = unsafe {
                detect_batch_raw(
                    handle,
                    data.as_ptr(),
                    1,
                    widths.as_ptr(),
                    heights.as_ptr(),
                    &params,
                )
            }?;
            Ok(unsafe { types::take_first(batch) })
        };
        report(detect(), ptr::null_mut())
    })
}

/// Detects objects in `num_images` RGBA images with one inference call. Release the result
/// with `onnx_free_batch_result`.
///
/// # Safety
/// `image_data_list`, `image_widths` and `image_heights` must be null or hold `num_images`
/// entries, and each image pointer must be null or hold `width * height * 4` bytes.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn onnx_detect_batch(
    handle: ModelHandle,
    image_data_list: *const *const u8,
    num_images: c_int,
    image_widths: *const c_int,
    image_heights: *const c_int,
    conf_threshold: f32,
    nms_threshold: f32,
    model_type: c_int,
    num_keypoints: c_int,
) -> *mut FfiBatchDetectionResult {
    guarded(ptr::null_mut(), || {
        let params = params_from_raw(conf_threshold, nms_threshold, model_type, num_keypoints);
        let result = unsafe {
            detect_batch_raw(
                handle,
                image_data_list,
                num_images,
                image_widths,
                image_heights,
                &params,
            )
        };
        report(result, ptr::null_mut())
    })
}

/// # Safety
/// `result` must be null or a live pointer returned by `onnx_detect`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn onnx_free_result(result: *mut FfiDetectionResult) {
    guarded((), || unsafe { types::free_result(result) })
}

/// # Safety
/// `result` must be null or a live pointer returned by `onnx_detect_batch`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn onnx_free_batch_result(result: *mut FfiBatchDetectionResult) {
    guarded((), || unsafe { types::free_batch(result) })
}

/// Static version string.
#[unsafe(no_mangle)]
pub extern "C" fn onnx_get_version() -> *const c_char {
    guarded(VERSION.as_ptr(), || VERSION.as_ptr())
}

/// Message of the last failure on this thread; empty when the last call succeeded.
#[unsafe(no_mangle)]
pub extern "C" fn onnx_get_last_error() -> *const c_char {
    last_error::message_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn onnx_get_last_error_code() -> c_int {
    last_error::code() as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn onnx_is_gpu_available() -> bool {
    guarded(false, accelerator::is_gpu_available)
}

#[unsafe(no_mangle)]
pub extern "C" fn onnx_get_gpu_info() -> GpuInfo {
    let unknown = GpuInfo::from(&accelerator::GpuReport {
        device_name: "unknown".to_string(),
        ..Default::default()
    });
    guarded(unknown, || GpuInfo::from(&accelerator::gpu_report()))
}

/// Comma separated execution providers. The string belongs to the library and stays valid
/// until the next call of this function on the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn onnx_get_available_providers() -> *const c_char {
    let joined = guarded(accelerator::CPU_PROVIDER.to_string(), || {
        accelerator::providers_string(&accelerator::available_providers())
    });
    let joined = CString::new(joined).unwrap_or_else(|_| CString::from(c"CPUExecutionProvider"));
    PROVIDERS.with(|slot| {
        let mut slot = slot.borrow_mut();
        *slot = joined;
        slot.as_ptr()
    })
}
