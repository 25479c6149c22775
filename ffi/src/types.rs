//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, pointer + length instead of `Vec`.
//! Requests are owned by the C caller and only read here. Responses are
//! allocated here and released with `rt_free_response`. Conversion
//! functions live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use roundtrip_core::{ErrorKind, HeaderField, Request, Response, TransportError};

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

// ---------------------------------------------------------------------------
// Request input (caller-provided)
// ---------------------------------------------------------------------------

/// An HTTP request described as C-compatible plain data.
///
/// `url` and `method` are required. `headers` may be null when
/// `headers_len` is 0, and `body` may be null when `body_len` is 0.
/// The library reads but never frees these fields.
#[repr(C)]
pub struct FfiHttpRequest {
    pub url: *const c_char,
    pub method: *const c_char,
    pub headers: *const FfiHeader,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: usize,
}

impl FfiHttpRequest {
    /// Copy the request into a core `Request`.
    ///
    /// # Safety
    /// Every non-null pointer must be valid for the length it is paired with,
    /// and every string must be NUL-terminated.
    pub(crate) unsafe fn to_core(&self) -> Result<Request, TransportError> {
        let url = unsafe { required_str(self.url, "url") }?;
        let method = unsafe { required_str(self.method, "method") }?;

        let mut headers = Vec::with_capacity(self.headers_len as usize);
        if self.headers_len > 0 {
            if self.headers.is_null() {
                return Err(invalid("headers is null but headers_len is not 0"));
            }
            let raw = unsafe { std::slice::from_raw_parts(self.headers, self.headers_len as usize) };
            for header in raw {
                headers.push(HeaderField::new(
                    unsafe { required_str(header.key, "header key") }?,
                    unsafe { required_str(header.value, "header value") }?,
                ));
            }
        }

        let body = if self.body_len == 0 {
            Vec::new()
        } else if self.body.is_null() {
            return Err(invalid("body is null but body_len is not 0"));
        } else {
            unsafe { std::slice::from_raw_parts(self.body, self.body_len) }.to_vec()
        };

        Ok(Request {
            url,
            method,
            headers,
            body,
        })
    }
}

unsafe fn required_str(ptr: *const c_char, what: &str) -> Result<String, TransportError> {
    if ptr.is_null() {
        return Err(invalid(&format!("null {what}")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|_| invalid(&format!("{what} is not valid UTF-8")))
}

/// Read an optional C string. Null and invalid UTF-8 both read as `None`.
pub(crate) unsafe fn optional_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn invalid(message: &str) -> TransportError {
    TransportError::new(ErrorKind::InvalidRequest, message)
}

// ---------------------------------------------------------------------------
// Response output (library-allocated)
// ---------------------------------------------------------------------------

/// A transport failure. `code` is one of the stable error codes.
#[repr(C)]
pub struct FfiHttpError {
    pub code: i64,
    pub message: *mut c_char,
}

/// An HTTP response described as C-compatible plain data.
///
/// On transport failure `status_code` is 0 and `error` is non-null; a
/// response whose body could not be read completely carries both a status
/// and an error. `headers` and `body` are null when empty.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status_code: u16,
    pub proto: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: usize,
    pub error: *mut FfiHttpError,
}

impl FfiHttpResponse {
    /// Convert a core `Response` into a heap-allocated `FfiHttpResponse`.
    pub(crate) fn from_core(resp: Response) -> *mut Self {
        let headers: Box<[FfiHeader]> = resp
            .headers
            .into_iter()
            .map(|h| FfiHeader {
                key: c_string(h.key),
                value: c_string(h.value),
            })
            .collect();
        let headers_len = headers.len() as u32;
        let headers = if headers.is_empty() {
            std::ptr::null_mut()
        } else {
            Box::into_raw(headers) as *mut FfiHeader
        };

        let body = resp.body.into_boxed_slice();
        let body_len = body.len();
        let body = if body.is_empty() {
            std::ptr::null_mut()
        } else {
            Box::into_raw(body) as *mut u8
        };

        let error = match resp.error {
            Some(err) => Box::into_raw(Box::new(FfiHttpError {
                code: err.code,
                message: c_string(err.message),
            })),
            None => std::ptr::null_mut(),
        };

        Box::into_raw(Box::new(FfiHttpResponse {
            status_code: resp.status_code,
            proto: c_string(resp.proto),
            headers,
            headers_len,
            body,
            body_len,
            error,
        }))
    }

    /// Build an error-only response.
    pub(crate) fn from_error(kind: ErrorKind, message: &str) -> *mut Self {
        Self::from_core(Response::from_error(TransportError::new(kind, message)))
    }

    /// Release everything `from_core` allocated.
    ///
    /// # Safety
    /// `resp` must come from `from_core` and must not be used afterwards.
    pub(crate) unsafe fn free(resp: *mut Self) {
        let resp = unsafe { Box::from_raw(resp) };
        free_c_string(resp.proto);
        if !resp.headers.is_null() {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    resp.headers,
                    resp.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                free_c_string(h.key);
                free_c_string(h.value);
            }
        }
        if !resp.body.is_null() {
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(resp.body, resp.body_len)) });
        }
        if !resp.error.is_null() {
            let error = unsafe { Box::from_raw(resp.error) };
            free_c_string(error.message);
        }
    }
}

/// Interior NUL bytes cannot cross as C strings; they are dropped.
fn c_string(s: String) -> *mut c_char {
    CString::new(s)
        .unwrap_or_else(|err| {
            let mut bytes = err.into_vec();
            bytes.retain(|&b| b != 0);
            CString::new(bytes).unwrap_or_default()
        })
        .into_raw()
}

fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
