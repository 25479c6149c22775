//! Drive the executor through a scripted engine using the JSON vectors in
//! `test-vectors/`.
//!
//! Each case names a request, the identity subject to present, what the
//! engine does (challenges, then an outcome or an error), and the response
//! the caller must observe.

mod support;

use std::sync::Arc;

use bytes::Bytes;
use roundtrip_core::{
    Completion, ErrorKind, HeaderField, NativeResponse, Request, RoundTripper, TransportError,
};
use serde_json::Value;
use support::{identities, Decided, ScriptedTransport};

/// Parse the error kind names used in the vectors.
fn parse_kind(s: &str) -> ErrorKind {
    match s {
        "invalid_request" => ErrorKind::InvalidRequest,
        "unsupported_scheme" => ErrorKind::UnsupportedScheme,
        "dns" => ErrorKind::Dns,
        "connect" => ErrorKind::Connect,
        "tls" => ErrorKind::Tls,
        "io" => ErrorKind::Io,
        "protocol" => ErrorKind::Protocol,
        "timeout" => ErrorKind::Timeout,
        "cancelled" => ErrorKind::Cancelled,
        "identity" => ErrorKind::Identity,
        "engine" => ErrorKind::Engine,
        other => panic!("unknown error kind: {other}"),
    }
}

fn pairs(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect()
}

fn transport_error(value: &Value) -> TransportError {
    TransportError::new(
        parse_kind(value["kind"].as_str().unwrap()),
        value["message"].as_str().unwrap(),
    )
}

fn request(value: &Value) -> Request {
    Request {
        url: value["url"].as_str().unwrap().to_string(),
        method: value["method"].as_str().unwrap().to_string(),
        headers: pairs(&value["headers"]).into_iter().map(HeaderField::from).collect(),
        body: value["body"].as_str().unwrap().as_bytes().to_vec(),
    }
}

fn outcome(engine: &Value) -> Completion {
    if let Some(error) = engine.get("error") {
        return Err(transport_error(error));
    }
    let out = &engine["outcome"];
    Ok(NativeResponse {
        status: out["status"].as_u64().unwrap() as u16,
        protocol: out["protocol"].as_str().unwrap().to_string(),
        headers: pairs(&out["headers"]),
        body: Bytes::from(out["body"].as_str().unwrap().to_string()),
        body_error: out.get("body_error").map(transport_error),
    })
}

#[test]
fn round_trip_test_vectors() {
    let raw = include_str!("../../test-vectors/round_trip.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let engine = &case["engine"];
        let expected = &case["expected"];

        let mut script = ScriptedTransport::new(outcome(engine))
            .challenges(engine["challenges"].as_u64().unwrap() as usize);
        if engine["echo_body"].as_bool().unwrap_or(false) {
            script = script.echo_body();
        }
        let transport = Arc::new(script);
        let rt = RoundTripper::new(transport.clone(), identities());
        let req = request(&case["request"]);
        let resp = rt.round_trip(&req, case["subject"].as_str().unwrap());

        // The engine saw exactly the caller's request.
        let sent = transport.requests();
        assert_eq!(sent.len(), 1, "{name}: tasks started");
        assert_eq!(sent[0].url, req.url, "{name}: url");
        assert_eq!(sent[0].method, req.method, "{name}: method");
        assert_eq!(sent[0].headers, pairs(&case["request"]["headers"]), "{name}: request headers");
        match &sent[0].body {
            Some(body) => assert_eq!(body.as_ref(), req.body.as_slice(), "{name}: request body"),
            None => assert!(req.body.is_empty(), "{name}: request body dropped"),
        }

        assert_eq!(
            u64::from(resp.status_code),
            expected["status_code"].as_u64().unwrap(),
            "{name}: status"
        );
        assert_eq!(resp.proto, expected["proto"].as_str().unwrap(), "{name}: proto");
        let headers: Vec<(String, String)> =
            resp.headers.iter().map(|h| (h.key.clone(), h.value.clone())).collect();
        assert_eq!(headers, pairs(&expected["headers"]), "{name}: headers");
        assert_eq!(resp.body, expected["body"].as_str().unwrap().as_bytes(), "{name}: body");

        match expected["error_kind"].as_str() {
            Some(kind) => {
                let error = resp.error.as_ref().unwrap_or_else(|| panic!("{name}: expected error"));
                assert_eq!(error.kind(), Some(parse_kind(kind)), "{name}: error kind");
                assert!(!error.message.is_empty(), "{name}: error message");
            }
            None => assert!(resp.error.is_none(), "{name}: unexpected error {:?}", resp.error),
        }

        let decided: Vec<Option<String>> = transport
            .decisions()
            .into_iter()
            .map(|d| match d {
                Decided::Credential { subject, .. } => Some(subject),
                Decided::Default => None,
            })
            .collect();
        let expected_decisions: Vec<Option<String>> = expected["decisions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d.as_str().map(str::to_string))
            .collect();
        assert_eq!(decided, expected_decisions, "{name}: challenge decisions");
    }
}
