//! The tokio + rustls + hyper transport engine.
//!
//! # Design
//! `TokioTransport` owns a multi-threaded runtime. `start` spawns one task
//! per request and returns immediately; the task resolves the host, connects,
//! runs the TLS handshake for https (with the task's sink answering client
//! certificate challenges), performs one HTTP/1.1 exchange over a fresh
//! connection, and reports the outcome to the sink. Connections are never
//! reused across round trips.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::HOST;
use http::{Method, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{self, TcpStream};
use tokio::runtime::{self, Runtime};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::RoundTripConfig;
use crate::engine::{Completion, EventSink, NativeResponse, TaskHandle, Transport};
use crate::error::ConfigError;
use crate::http::{ErrorKind, TransportError};
use crate::tls::TlsSettings;
use crate::translate::NativeRequest;

/// Transport engine running on its own tokio worker threads.
#[derive(Debug)]
pub struct TokioTransport {
    runtime: Runtime,
    tls: Arc<TlsSettings>,
}

impl TokioTransport {
    pub fn new(worker_threads: usize, tls: TlsSettings) -> Result<Self, ConfigError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("roundtrip-worker")
            .enable_all()
            .build()
            .map_err(ConfigError::Runtime)?;
        Ok(Self {
            runtime,
            tls: Arc::new(tls),
        })
    }

    pub fn from_config(config: &RoundTripConfig) -> Result<Self, ConfigError> {
        Self::new(config.worker_threads, TlsSettings::from_config(config)?)
    }
}

impl Transport for TokioTransport {
    fn start(&self, request: NativeRequest, sink: Arc<dyn EventSink>) -> TaskHandle {
        let tls = self.tls.clone();
        let task = self.runtime.spawn(async move {
            let completion = execute(request, sink.clone(), tls).await;
            sink.on_task_complete(completion);
        });
        TaskHandle::new(move || task.abort())
    }
}

/// Where a request goes, split out of its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    secure: bool,
    host: String,
    port: u16,
    authority: String,
    path_and_query: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| invalid(format!("invalid url {url:?}: {e}")))?;
        let secure = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            Some(other) => {
                return Err(TransportError::new(
                    ErrorKind::UnsupportedScheme,
                    format!("unsupported url scheme {other:?}"),
                ))
            }
            None => return Err(invalid(format!("url {url:?} has no scheme"))),
        };
        let authority = uri
            .authority()
            .ok_or_else(|| invalid(format!("url {url:?} has no host")))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let path_and_query = match uri.path_and_query().map(|p| p.as_str()) {
            Some(p) if p.starts_with('/') => p.to_string(),
            Some(p) => format!("/{p}"),
            None => "/".to_string(),
        };
        Ok(Self {
            secure,
            port: authority.port_u16().unwrap_or(if secure { 443 } else { 80 }),
            authority: authority.as_str().to_string(),
            host,
            path_and_query,
        })
    }
}

fn invalid(message: String) -> TransportError {
    TransportError::new(ErrorKind::InvalidRequest, message)
}

async fn execute(
    request: NativeRequest,
    sink: Arc<dyn EventSink>,
    tls: Arc<TlsSettings>,
) -> Completion {
    let target = Target::parse(&request.url)?;
    let wire_request = to_wire_request(request, &target)?;
    let stream = connect(&target).await?;

    if !target.secure {
        return exchange(stream, wire_request).await;
    }

    let config = tls
        .client_config(sink, &target.host)
        .map_err(|e| TransportError::new(ErrorKind::Tls, e.to_string()))?;
    let server_name = ServerName::try_from(target.host.clone())
        .map_err(|e| invalid(format!("invalid server name {:?}: {e}", target.host)))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .map_err(|e| {
            TransportError::new(
                ErrorKind::Tls,
                format!("TLS handshake with {} failed: {e}", target.host),
            )
        })?;
    exchange(stream, wire_request).await
}

fn to_wire_request(
    request: NativeRequest,
    target: &Target,
) -> Result<http::Request<Full<Bytes>>, TransportError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| invalid(format!("invalid method {:?}", request.method)))?;
    let mut builder = http::Request::builder()
        .method(method)
        .uri(target.path_and_query.as_str());
    if !request.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("host")) {
        builder = builder.header(HOST, target.authority.as_str());
    }
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
        .body(Full::new(request.body.unwrap_or_default()))
        .map_err(|e| invalid(format!("invalid request: {e}")))
}

async fn connect(target: &Target) -> Result<TcpStream, TransportError> {
    let addrs: Vec<SocketAddr> = net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| {
            TransportError::new(
                ErrorKind::Dns,
                format!("could not resolve host {}: {e}", target.host),
            )
        })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::new(
            ErrorKind::Dns,
            format!("host {} has no addresses", target.host),
        ));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    debug!(%addr, %err, "could not disable Nagle's algorithm");
                }
                debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%addr, %err, "connect attempt failed");
                last_error = Some(err);
            }
        }
    }
    Err(TransportError::new(
        ErrorKind::Connect,
        format!(
            "could not connect to {}:{}: {}",
            target.host,
            target.port,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ),
    ))
}

async fn exchange<S>(stream: S, request: http::Request<Full<Bytes>>) -> Completion
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(classify)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!(%err, "connection closed with error");
        }
    });

    let response = sender.send_request(request).await.map_err(classify)?;
    let (parts, body) = response.into_parts();
    let headers = parts
        .headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();

    let (body, body_error) = match body.collect().await {
        Ok(collected) => (collected.to_bytes(), None),
        Err(err) => (
            Bytes::new(),
            Some(TransportError::new(
                ErrorKind::Io,
                format!("failed reading response body: {err}"),
            )),
        ),
    };

    Ok(NativeResponse {
        status: parts.status.as_u16(),
        protocol: protocol_id(parts.version).to_string(),
        headers,
        body,
        body_error,
    })
}

fn protocol_id(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "http/0.9",
        Version::HTTP_10 => "http/1.0",
        Version::HTTP_2 => "h2",
        Version::HTTP_3 => "h3",
        _ => "http/1.1",
    }
}

fn classify(err: hyper::Error) -> TransportError {
    let kind = if err.is_canceled() {
        ErrorKind::Cancelled
    } else if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_parse() {
        ErrorKind::Protocol
    } else {
        ErrorKind::Io
    };
    TransportError::new(kind, err.to_string())
}
