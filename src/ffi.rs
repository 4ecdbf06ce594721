//! FFI bindings for trainload
//!
//! This module provides C-compatible functions for calling trainload from other
//! languages. Activity files are passed as raw byte buffers; everything else is
//! exchanged as null-terminated JSON strings. Returned strings are allocated by
//! the library and must be freed by the caller using `tl_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::batch::BatchInput;
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::pipeline::{build_load_series, decode_activity, score_activity, TrainingLoadProcessor};
use crate::types::{ActivitySummary, LoadSeries, ScoredActivity, StressScoreResult};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Borrow a caller buffer; NULL is only accepted with a zero length
unsafe fn bytes_from<'a>(bytes: *const u8, len: usize) -> Option<&'a [u8]> {
    if bytes.is_null() {
        return if len == 0 { Some(&[][..]) } else { None };
    }
    Some(slice::from_raw_parts(bytes, len))
}

/// Parse an optional JSON config; NULL means defaults
unsafe fn config_from(config_json: *const c_char) -> Result<EngineConfig, ComputeError> {
    match cstr_to_string(config_json) {
        Some(json) => EngineConfig::from_json(&json),
        None => Ok(EngineConfig::default()),
    }
}

/// Parse an optional `YYYY-MM-DD` day; NULL means the current UTC date
unsafe fn today_from(today: *const c_char) -> Result<NaiveDate, ComputeError> {
    match cstr_to_string(today) {
        Some(day) => NaiveDate::parse_from_str(&day, "%Y-%m-%d")
            .map_err(|e| ComputeError::InvalidConfig(format!("invalid date {day:?}: {e}"))),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Serialize a result to a C string, recording any error
fn json_result<T: Serialize>(result: Result<T, ComputeError>) -> *mut c_char {
    match result.and_then(|value| serde_json::to_string(&value).map_err(ComputeError::JsonError)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

#[derive(Serialize)]
struct DecodedActivity {
    summary: ActivitySummary,
    stress: StressScoreResult,
}

// ============================================================================
// Stateless API
// ============================================================================

/// Decode one activity file and return `{"summary": ..., "stress": ...}` JSON.
///
/// # Safety
/// - `bytes` must point to `len` readable bytes (or be NULL with `len == 0`).
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `tl_free_string`.
/// - Returns NULL on error; call `tl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tl_decode_activity(
    bytes: *const u8,
    len: usize,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let buf = match bytes_from(bytes, len) {
        Some(b) => b,
        None => {
            set_last_error("Invalid byte buffer pointer");
            return ptr::null_mut();
        }
    };

    json_result(config_from(config_json).and_then(|config| {
        let summary = decode_activity(buf, &config)?;
        let stress = score_activity(&summary, &config);
        Ok(DecodedActivity { summary, stress })
    }))
}

/// Score a JSON array of activity summaries and return the load series JSON.
///
/// # Safety
/// - `activities_json` must be a valid null-terminated C string.
/// - `config_json` and `today` (`YYYY-MM-DD`) may be NULL for defaults.
/// - Returns a newly allocated string that must be freed with `tl_free_string`.
/// - Returns NULL on error; call `tl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tl_load_series(
    activities_json: *const c_char,
    config_json: *const c_char,
    today: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(activities_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid activities JSON string pointer");
            return ptr::null_mut();
        }
    };

    json_result((|| -> Result<LoadSeries, ComputeError> {
        let config = config_from(config_json)?;
        let today = today_from(today)?;
        let summaries: Vec<ActivitySummary> = serde_json::from_str(&json)?;
        let activities: Vec<ScoredActivity> = summaries
            .into_iter()
            .enumerate()
            .map(|(i, summary)| ScoredActivity {
                id: i.to_string(),
                stress: score_activity(&summary, &config),
                summary,
            })
            .collect();
        Ok(build_load_series(&activities, today, &config))
    })())
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a TrainingLoadProcessor
pub struct TrainingLoadHandle {
    processor: TrainingLoadProcessor,
}

/// Create a new processor.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer that must be freed with `tl_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn tl_processor_new(config_json: *const c_char) -> *mut TrainingLoadHandle {
    clear_last_error();

    match config_from(config_json) {
        Ok(config) => Box::into_raw(Box::new(TrainingLoadHandle {
            processor: TrainingLoadProcessor::with_config(config),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tl_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tl_processor_free(processor: *mut TrainingLoadHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Import one activity file. Returns 1 if added, 0 if its id was already
/// known, -1 on error.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tl_processor_new`.
/// - `id` must be a valid null-terminated C string.
/// - `bytes` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tl_processor_add_file(
    processor: *mut TrainingLoadHandle,
    id: *const c_char,
    bytes: *const u8,
    len: usize,
) -> i32 {
    clear_last_error();

    let handle = match processor.as_mut() {
        Some(h) => h,
        None => {
            set_last_error("Invalid processor pointer");
            return -1;
        }
    };
    let (id, buf) = match (cstr_to_string(id), bytes_from(bytes, len)) {
        (Some(id), Some(buf)) => (id, buf),
        _ => {
            set_last_error("Invalid id or byte buffer pointer");
            return -1;
        }
    };

    let stats = handle
        .processor
        .add_files(&[BatchInput::new(id.clone(), buf.to_vec())]);
    if stats.added == 1 {
        1
    } else if stats.skipped == 1 {
        0
    } else {
        let message = handle
            .processor
            .failures()
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "Activity rejected".to_string());
        set_last_error(&message);
        -1
    }
}

/// Load a previous export into a processor. Returns 0 on success, -1 on error.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tl_processor_new`.
/// - `export_json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn tl_processor_load_export(
    processor: *mut TrainingLoadHandle,
    export_json: *const c_char,
) -> i32 {
    clear_last_error();

    let handle = match processor.as_mut() {
        Some(h) => h,
        None => {
            set_last_error("Invalid processor pointer");
            return -1;
        }
    };
    let json = match cstr_to_string(export_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid export JSON string pointer");
            return -1;
        }
    };

    match handle.processor.load_export(&json) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Produce the export document JSON for everything imported so far.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tl_processor_new`.
/// - Returns a newly allocated string that must be freed with `tl_free_string`.
/// - Returns NULL on error; call `tl_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tl_processor_export(processor: *mut TrainingLoadHandle) -> *mut c_char {
    clear_last_error();

    match processor.as_ref() {
        Some(handle) => json_result(handle.processor.export()),
        None => {
            set_last_error("Invalid processor pointer");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by trainload functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a trainload function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tl_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next trainload call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn tl_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tl_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
