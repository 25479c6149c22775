//! Plain-data request and response types for one round trip.
//!
//! # Design
//! These types are the caller-facing surface of the crate. They carry no
//! behavior tied to the network engine: a `Request` is handed to
//! `RoundTripper::round_trip` and a `Response` comes back, always. Transport
//! failures never escape as `Err`; they ride on `Response::error` so the
//! executor has exactly one return path.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross FFI
//! boundaries without lifetime concerns.

use http::StatusCode;

/// One HTTP header. Order within a header list is preserved and duplicate
/// keys are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub key: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String)> for HeaderField {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

/// An HTTP request described as plain data.
///
/// No validation happens at construction; a malformed URL or method surfaces
/// as a `TransportError` on the returned `Response`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub headers: Vec<HeaderField>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header. Existing headers with the same key are kept.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderField::new(key, value));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Stable error codes carried in `TransportError::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// URL, method, or header could not be turned into a wire request.
    InvalidRequest = 1,
    /// The URL scheme is neither `http` nor `https`.
    UnsupportedScheme = 2,
    /// Host name resolution failed.
    Dns = 3,
    /// No resolved address accepted a TCP connection.
    Connect = 4,
    /// The TLS handshake failed.
    Tls = 5,
    /// Reading or writing the connection failed.
    Io = 6,
    /// The peer sent something that is not valid HTTP.
    Protocol = 7,
    /// The round trip exceeded its deadline.
    Timeout = 8,
    /// The task was cancelled before producing an outcome.
    Cancelled = 9,
    /// The client identity could not be resolved unambiguously.
    Identity = 10,
    /// The transport engine is unavailable or crashed.
    Engine = 11,
}

impl ErrorKind {
    const ALL: [ErrorKind; 11] = [
        ErrorKind::InvalidRequest,
        ErrorKind::UnsupportedScheme,
        ErrorKind::Dns,
        ErrorKind::Connect,
        ErrorKind::Tls,
        ErrorKind::Io,
        ErrorKind::Protocol,
        ErrorKind::Timeout,
        ErrorKind::Cancelled,
        ErrorKind::Identity,
        ErrorKind::Engine,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// A failure below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error ({code}): {message}")]
pub struct TransportError {
    pub code: i64,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
        }
    }

    /// The crate-defined kind, or `None` for codes from a foreign engine.
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }
}

/// The outcome of one round trip.
///
/// Either `status_code`/`body` are meaningful or `error` is set. When the
/// response head arrived but the body read failed, both are populated: the
/// head fields keep what was received and `error` describes the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub proto: String,
    pub headers: Vec<HeaderField>,
    pub body: Vec<u8>,
    pub error: Option<TransportError>,
}

impl Response {
    /// A response carrying only a transport error; all other fields are
    /// left at their zero values.
    pub fn from_error(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// True when no transport error occurred and the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }

    /// First value for `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name` in received order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Canonical reason phrase for `status_code`, empty when unknown.
    pub fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status_code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }

    /// Split off the transport error, if any. HTTP error statuses are not
    /// transport errors and stay `Ok`.
    pub fn into_result(self) -> Result<Response, TransportError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_headers(headers: &[(&str, &str)]) -> Response {
        Response {
            status_code: 200,
            proto: "HTTP/1.1".to_string(),
            headers: headers.iter().map(|(k, v)| HeaderField::new(*k, *v)).collect(),
            body: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn request_builder_keeps_duplicate_headers_in_order() {
        let req = Request::new("GET", "https://example.test/")
            .header("Accept", "text/plain")
            .header("X-Trace", "a")
            .header("X-Trace", "b");
        let keys: Vec<_> = req.headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, ["Accept", "X-Trace", "X-Trace"]);
        assert_eq!(req.headers[2].value, "b");
        assert!(req.body.is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = response_with_headers(&[("content-type", "text/plain")]);
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn header_value_outlives_the_lookup_name() {
        let resp = response_with_headers(&[("Content-Type", "text/plain")]);
        let value = {
            let name = String::from("content-type");
            resp.header(&name)
        };
        assert_eq!(value, Some("text/plain"));
    }

    #[test]
    fn header_values_returns_every_duplicate() {
        let resp = response_with_headers(&[("x-multi", "a"), ("other", "z"), ("X-Multi", "b")]);
        let values: Vec<_> = resp.header_values("x-multi").collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn error_response_has_zero_values() {
        let resp = Response::from_error(TransportError::new(ErrorKind::Dns, "no such host"));
        assert_eq!(resp.status_code, 0);
        assert!(resp.proto.is_empty());
        assert!(resp.headers.is_empty());
        assert!(resp.body.is_empty());
        assert!(!resp.is_success());
        assert_eq!(resp.error.as_ref().and_then(TransportError::kind), Some(ErrorKind::Dns));
    }

    #[test]
    fn http_error_status_is_not_a_transport_error() {
        let mut resp = response_with_headers(&[]);
        resp.status_code = 503;
        assert!(!resp.is_success());
        assert_eq!(resp.status_text(), "Service Unavailable");
        let resp = resp.into_result().unwrap();
        assert_eq!(resp.status_code, 503);
    }

    #[test]
    fn into_result_surfaces_transport_error() {
        let resp = Response::from_error(TransportError::new(ErrorKind::Timeout, "deadline"));
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "transport error (8): deadline");
    }

    #[test]
    fn error_kind_codes_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(-1003), None);
    }

    #[test]
    fn unknown_status_has_empty_text() {
        let mut resp = response_with_headers(&[]);
        resp.status_code = 0;
        assert_eq!(resp.status_text(), "");
    }
}
