//! C-ABI wrapper around `roundtrip-core`.
//!
//! # Overview
//! Exposes the blocking round trip through `extern "C"` functions so any
//! language with a C FFI can perform HTTP(S) requests, optionally presenting
//! a client certificate, without linking to Rust's async runtime directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - One process-wide `RoundTripper`, installed by `rt_configure` or built
//!   from `ROUNDTRIP_*` environment variables on first use.
//! - `rt_round_trip` never returns null: every failure is an
//!   `FfiHttpResponse` with a non-null `error`.
//! - The C caller owns every returned response and must release it with
//!   `rt_free_response`.

pub mod types;

use std::any::Any;
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::sync::OnceLock;

use roundtrip_core::{ConfigError, ErrorKind, RoundTripConfig, RoundTripper};
use tracing_subscriber::EnvFilter;

use types::*;

static ROUND_TRIPPER: OnceLock<RoundTripper> = OnceLock::new();

fn round_tripper() -> Result<&'static RoundTripper, ConfigError> {
    if let Some(rt) = ROUND_TRIPPER.get() {
        return Ok(rt);
    }
    let rt = RoundTripper::from_config(&RoundTripConfig::from_env()?)?;
    // A concurrent first call may win the race; its instance is kept.
    Ok(ROUND_TRIPPER.get_or_init(|| rt))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Install the process-wide configuration from a JSON document.
///
/// Must be called before the first `rt_round_trip`. Returns false if `json`
/// is null or invalid, if the transport engine cannot start, or if a round
/// tripper is already installed.
#[unsafe(no_mangle)]
pub extern "C" fn rt_configure(json: *const c_char) -> bool {
    catch_unwind(|| {
        let Some(json) = (unsafe { optional_str(json) }) else {
            return false;
        };
        let config = match RoundTripConfig::from_json(json) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(%err, "rejected configuration");
                return false;
            }
        };
        if ROUND_TRIPPER.get().is_some() {
            tracing::warn!("round tripper already installed");
            return false;
        }
        match RoundTripper::from_config(&config) {
            Ok(rt) => ROUND_TRIPPER.set(rt).is_ok(),
            Err(err) => {
                tracing::warn!(%err, "failed to start round tripper");
                false
            }
        }
    })
    .unwrap_or(false)
}

/// Install a `tracing` subscriber that writes to stderr, filtered by
/// `RUST_LOG` (default `warn`). Calling it again is a no-op.
#[unsafe(no_mangle)]
pub extern "C" fn rt_init_logging() {
    let _ = catch_unwind(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

/// Perform one blocking round trip.
///
/// `subject_name` selects the client identity to present when the server
/// asks for one; null or empty means none. Never returns null. The caller
/// must free the returned pointer with `rt_free_response`.
#[unsafe(no_mangle)]
pub extern "C" fn rt_round_trip(
    req: *const FfiHttpRequest,
    subject_name: *const c_char,
) -> *mut FfiHttpResponse {
    catch_unwind(|| {
        if req.is_null() {
            return FfiHttpResponse::from_error(ErrorKind::InvalidRequest, "null argument: req");
        }
        let request = match unsafe { (*req).to_core() } {
            Ok(request) => request,
            Err(err) => return FfiHttpResponse::from_error(ErrorKind::InvalidRequest, &err.message),
        };
        let subject = if subject_name.is_null() {
            ""
        } else {
            match unsafe { optional_str(subject_name) } {
                Some(subject) => subject,
                None => {
                    return FfiHttpResponse::from_error(
                        ErrorKind::InvalidRequest,
                        "subject_name is not valid UTF-8",
                    )
                }
            }
        };
        let rt = match round_tripper() {
            Ok(rt) => rt,
            Err(err) => {
                return FfiHttpResponse::from_error(
                    ErrorKind::Engine,
                    &format!("round tripper unavailable: {err}"),
                )
            }
        };
        FfiHttpResponse::from_core(rt.round_trip(&request, subject))
    })
    .unwrap_or_else(|payload| {
        FfiHttpResponse::from_error(
            ErrorKind::Engine,
            &format!("panic in rt_round_trip: {}", panic_message(payload.as_ref())),
        )
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpResponse` returned by `rt_round_trip`. Safe to call with
/// null.
#[unsafe(no_mangle)]
pub extern "C" fn rt_free_response(resp: *mut FfiHttpResponse) {
    if resp.is_null() {
        return;
    }
    let _ = catch_unwind(|| unsafe { FfiHttpResponse::free(resp) });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
