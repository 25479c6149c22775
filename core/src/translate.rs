//! Conversion from the caller's `Request` into the engine's request type.

use bytes::Bytes;

use crate::http::Request;

/// The request as the transport engine receives it.
///
/// Nothing here is validated; the engine reports malformed URLs, methods, or
/// header names as a `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

/// Copy `request` verbatim into a `NativeRequest`. Header order and
/// duplicates are kept; an empty body becomes `None`.
pub fn build_native_request(request: &Request) -> NativeRequest {
    NativeRequest {
        url: request.url.clone(),
        method: request.method.clone(),
        headers: request
            .headers
            .iter()
            .map(|h| (h.key.clone(), h.value.clone()))
            .collect(),
        body: if request.body.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(&request.body))
        },
    }
}
