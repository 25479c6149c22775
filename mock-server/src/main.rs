use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// `PORT` picks the port (default 3000). `MOCK_TLS=1` serves the fixture
/// identity over TLS and asks clients for a certificate.
#[tokio::main]
async fn main() -> Result<(), mock_server::BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;

    if std::env::var("MOCK_TLS").is_ok_and(|v| v == "1") {
        tracing::info!(%addr, "listening (TLS)");
        mock_server::run_tls(listener, mock_server::fixture_tls_config(true)?).await?;
    } else {
        tracing::info!(%addr, "listening");
        mock_server::run(listener).await?;
    }
    Ok(())
}
