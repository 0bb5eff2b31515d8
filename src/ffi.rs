//! C-compatible FFI API for host applications.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Input
//! A gazette manifest (the JSON format documented in [`crate::store`]) is
//! passed as a byte buffer together with the id of the gazette to render.
//! Each call builds its own in-memory store and runtime; nothing is shared
//! between calls.
//!
//! ## Memory management
//! - Buffers returned by `gzp_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `gzp_free_buffer` / `gzp_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int`:
//!   `0` success, `1` null pointer, `2` invalid input (UTF-8, manifest or
//!   config), `3` generation failed, `4` runtime could not start.
//! - Error details can be retrieved via `gzp_last_error`.
//!
//! ## Thread safety
//! - `gzp_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//!
//! ## Usage from C
//! ```c
//! #include "gazette_press.h"
//!
//! uint8_t *pdf; uint32_t len;
//! if (gzp_generate_layout(manifest, manifest_len, "g-1", &pdf, &len) != 0) {
//!     fprintf(stderr, "%s\n", gzp_last_error());
//! }
//! gzp_free_buffer(pdf, len);
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;
use std::sync::Arc;

use crate::codec::RasterCodec;
use crate::config::EngineConfig;
use crate::model::GazetteId;
use crate::pipeline::{LayoutService, RenderedDocument};
use crate::render::PdfWriterFactory;
use crate::store::InMemoryStore;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Failure inside [`generate`], mapped to an FFI return code.
enum Failure {
    Input(String),
    Generation(String),
    Runtime(String),
}

impl Failure {
    fn report(self) -> c_int {
        let (code, msg) = match self {
            Failure::Input(m) => (2, m),
            Failure::Generation(m) => (3, m),
            Failure::Runtime(m) => (4, m),
        };
        set_last_error(&msg);
        code
    }
}

/// Read a null-terminated UTF-8 string.
///
/// # Safety
/// `s` must be a valid null-terminated string.
unsafe fn read_str<'a>(s: *const c_char, what: &str) -> Result<&'a str, Failure> {
    CStr::from_ptr(s)
        .to_str()
        .map_err(|e| Failure::Input(format!("Invalid UTF-8 in {what}: {e}")))
}

fn generate(
    manifest: &[u8],
    config: &EngineConfig,
    gazette_id: &str,
) -> Result<RenderedDocument, Failure> {
    let store = InMemoryStore::from_json(manifest)
        .map_err(|e| Failure::Input(format!("Invalid manifest: {e}")))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| Failure::Runtime(format!("Runtime start failed: {e}")))?;

    let service = LayoutService::new(store, Arc::new(RasterCodec::default()), PdfWriterFactory, config);
    let id = GazetteId::new(gazette_id);
    runtime
        .block_on(service.render(&id, &service.context()))
        .map_err(|e| Failure::Generation(e.to_string()))
}

/// Hand the document bytes to the caller.
///
/// # Safety
/// `out_buf` and `out_len` must be valid pointers.
unsafe fn emit_buffer(bytes: Vec<u8>, out_buf: *mut *mut u8, out_len: *mut u32) -> c_int {
    let len = match u32::try_from(bytes.len()) {
        Ok(len) => len,
        Err(_) => {
            set_last_error("Document exceeds 4 GiB");
            return 3;
        }
    };
    let buf = bytes.into_boxed_slice();
    *out_buf = Box::into_raw(buf) as *mut u8;
    *out_len = len;
    0
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Generate the print-ready PDF for one gazette of a manifest.
///
/// # Parameters
/// - `manifest_ptr`: pointer to manifest JSON bytes (not necessarily null-terminated)
/// - `manifest_len`: length of the manifest in bytes
/// - `gazette_id`: null-terminated UTF-8 gazette id
/// - `out_buf`: on success, receives a pointer to heap-allocated PDF bytes
/// - `out_len`: on success, receives the length of the PDF buffer
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `gzp_last_error`.
///
/// # Safety
/// - `manifest_ptr` must point to `manifest_len` valid bytes.
/// - `gazette_id` must be a valid null-terminated string.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` by calling `gzp_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn gzp_generate_layout(
    manifest_ptr: *const u8,
    manifest_len: u32,
    gazette_id: *const c_char,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    gzp_generate_layout_ex(manifest_ptr, manifest_len, gazette_id, ptr::null(), out_buf, out_len)
}

/// Like [`gzp_generate_layout`], with an engine config JSON document.
///
/// `config_json` may be `NULL` to use the defaults. Missing fields take their
/// defaults as well.
///
/// # Safety
/// Same as `gzp_generate_layout`. `config_json`, if non-null, must be a valid
/// null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gzp_generate_layout_ex(
    manifest_ptr: *const u8,
    manifest_len: u32,
    gazette_id: *const c_char,
    config_json: *const c_char,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if manifest_ptr.is_null() || gazette_id.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let manifest = slice::from_raw_parts(manifest_ptr, manifest_len as usize);
    let result = match (read_str(gazette_id, "gazette id"), config_from_c(config_json)) {
        (Ok(id), Ok(config)) => generate(manifest, &config, id),
        (Err(f), _) | (_, Err(f)) => Err(f),
    };

    match result {
        Ok(doc) => emit_buffer(doc.bytes, out_buf, out_len),
        Err(f) => f.report(),
    }
}

/// Generate the document and return only its layout report as JSON:
/// page size, bleed, colour space, page count and every placement.
///
/// # Safety
/// Same as `gzp_generate_layout`. `*out_json_ptr` must be freed with
/// `gzp_free_string`.
#[no_mangle]
pub unsafe extern "C" fn gzp_layout_report(
    manifest_ptr: *const u8,
    manifest_len: u32,
    gazette_id: *const c_char,
    out_json_ptr: *mut *mut c_char,
) -> c_int {
    if manifest_ptr.is_null() || gazette_id.is_null() || out_json_ptr.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let manifest = slice::from_raw_parts(manifest_ptr, manifest_len as usize);
    let result = match read_str(gazette_id, "gazette id") {
        Ok(id) => generate(manifest, &EngineConfig::default(), id),
        Err(f) => Err(f),
    };

    match result {
        Ok(doc) => match CString::new(doc.report().to_json()) {
            Ok(cs) => {
                *out_json_ptr = cs.into_raw();
                0
            }
            Err(_) => {
                set_last_error("JSON contained null byte");
                3
            }
        },
        Err(f) => f.report(),
    }
}

/// # Safety
/// `config_json`, if non-null, must be a valid null-terminated string.
unsafe fn config_from_c(config_json: *const c_char) -> Result<EngineConfig, Failure> {
    if config_json.is_null() {
        return Ok(EngineConfig::default());
    }
    let json = read_str(config_json, "config")?;
    EngineConfig::from_json(json).map_err(|e| Failure::Input(format!("Invalid config: {e}")))
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by `gzp_generate_layout`.
///
/// # Safety
/// `buf` must have been returned by a previous `gzp_generate_layout` (or
/// `_ex`) call, and `len` must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn gzp_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `gzp_layout_report`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn gzp_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next failing `gzp_*` call on the
/// same thread. The caller should **not** free this pointer.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn gzp_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn gzp_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
