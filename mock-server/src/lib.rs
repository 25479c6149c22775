use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use rustls::{
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
    RootCertStore, ServerConfig,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// PEM fixtures shared by the workspace tests.
pub mod fixtures {
    pub const CA_PEM: &[u8] = include_bytes!("../../testdata/ca.pem");
    pub const SERVER_CERT_PEM: &[u8] = include_bytes!("../../testdata/server.pem");
    pub const SERVER_KEY_PEM: &[u8] = include_bytes!("../../testdata/server.key");
}

/// Subject common name of the client certificate on this connection.
#[derive(Clone, Debug, Default)]
pub struct PeerIdentity(pub Option<String>);

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn app() -> Router {
    app_for(PeerIdentity::default())
}

fn app_for(peer: PeerIdentity) -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/echo", any(echo))
        .route("/status/{code}", get(status))
        .route("/slow/{ms}", get(slow))
        .route("/multi", get(multi))
        .route("/whoami", get(whoami))
        .layer(Extension(peer))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve the same routes over TLS. Each connection's router knows the
/// client certificate subject, if one was presented.
pub async fn run_tls(listener: TcpListener, config: Arc<ServerConfig>) -> Result<(), std::io::Error> {
    let acceptor = TlsAcceptor::from(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(err) => {
                    tracing::debug!(%peer, %err, "TLS accept failed");
                    return;
                }
            };
            let identity = tls
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .and_then(common_name);
            let service = TowerToHyperService::new(app_for(PeerIdentity(identity)));
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(tls), service)
                .await
            {
                tracing::debug!(%peer, %err, "connection ended with error");
            }
        });
    }
}

/// Server TLS configuration. With `client_ca_pem` the server asks every
/// client for a certificate signed by that CA but still accepts clients
/// that send none.
pub fn tls_config(
    cert_pem: &[u8],
    key_pem: &[u8],
    client_ca_pem: Option<&[u8]>,
) -> Result<Arc<ServerConfig>, BoxError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let certs = CertificateDer::pem_slice_iter(cert_pem).collect::<Result<Vec<_>, _>>()?;
    let key = PrivateKeyDer::from_pem_slice(key_pem)?;

    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;
    let builder = match client_ca_pem {
        Some(ca_pem) => {
            let mut roots = RootCertStore::empty();
            for cert in CertificateDer::pem_slice_iter(ca_pem) {
                roots.add(cert?)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .allow_unauthenticated()
                .build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// The fixture server identity, optionally asking for client certificates
/// issued by the fixture CA.
pub fn fixture_tls_config(request_client_cert: bool) -> Result<Arc<ServerConfig>, BoxError> {
    tls_config(
        fixtures::SERVER_CERT_PEM,
        fixtures::SERVER_KEY_PEM,
        request_client_cert.then_some(fixtures::CA_PEM),
    )
}

/// Start a plain HTTP server on a random port in a background thread.
pub fn spawn() -> Result<SocketAddr, std::io::Error> {
    let (listener, addr) = bind_random()?;
    std::thread::spawn(move || {
        serve_blocking(async move {
            let listener = TcpListener::from_std(listener)?;
            run(listener).await
        })
    });
    Ok(addr)
}

/// Start a TLS server on a random port in a background thread.
pub fn spawn_tls(config: Arc<ServerConfig>) -> Result<SocketAddr, std::io::Error> {
    let (listener, addr) = bind_random()?;
    std::thread::spawn(move || {
        serve_blocking(async move {
            let listener = TcpListener::from_std(listener)?;
            run_tls(listener, config).await
        })
    });
    Ok(addr)
}

fn bind_random() -> Result<(std::net::TcpListener, SocketAddr), std::io::Error> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

fn serve_blocking<F>(server: F)
where
    F: std::future::Future<Output = Result<(), std::io::Error>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "failed to start mock server runtime");
            return;
        }
    };
    if let Err(err) = runtime.block_on(server) {
        tracing::error!(%err, "mock server stopped");
    }
}

fn common_name(cert: &CertificateDer<'_>) -> Option<String> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    let cn = parsed.subject().iter_common_name().next()?;
    cn.as_str().ok().map(str::to_string)
}

async fn ok() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "hello")
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> (StatusCode, String) {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")),
        Err(_) => (StatusCode::BAD_REQUEST, format!("invalid status {code}")),
    }
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

async fn multi() -> (HeaderMap, &'static str) {
    let mut headers = HeaderMap::new();
    headers.append("x-multi", HeaderValue::from_static("a"));
    headers.append("x-multi", HeaderValue::from_static("b"));
    (headers, "multi")
}

async fn whoami(Extension(peer): Extension<PeerIdentity>) -> String {
    peer.0.unwrap_or_else(|| "anonymous".to_string())
}
