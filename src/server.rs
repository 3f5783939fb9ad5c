//! HTTP server exposing the exporter to Prometheus
//!
//! Serves `/metrics` in the text exposition format plus a landing page and a
//! liveness probe.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::api::public::Exporter;
use crate::config::GlobalConfig;
use crate::error::ExporterError;
use crate::exposition::TEXT_CONTENT_TYPE;

/// Header Prometheus uses to advertise its scrape timeout
pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

const METRICS_PATH: &str = "/metrics";
const HEALTH_PATH: &str = "/healthz";
const LANDING_PAGE: &str = "<html>\n\
<head><title>Elasticsearch Exporter</title></head>\n\
<body>\n\
<h1>Elasticsearch Exporter</h1>\n\
<p><a href=\"/metrics\">Metrics</a></p>\n\
</body>\n\
</html>\n";

/// HTTP server serving scrapes from a shared [`Exporter`]
pub struct MetricsServer {
    exporter: Arc<Exporter>,
    address: String,
}

impl MetricsServer {
    /// Create a server listening on the configured `listen_address`
    pub fn new(exporter: Arc<Exporter>) -> Self {
        let address = exporter.config().global.listen_address.clone();
        Self { exporter, address }
    }

    /// Override the listen address (e.g. `127.0.0.1:0` in tests)
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Start the HTTP server
    ///
    /// Returns the bound address and a handle that can be aborted to stop serving.
    pub async fn start(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), ExporterError> {
        let listener = TcpListener::bind(&self.address).await.map_err(|e| {
            ExporterError::Server(format!("failed to bind {}: {}", self.address, e))
        })?;
        let local_addr = listener.local_addr()?;

        info!(address = %local_addr, "Metrics HTTP server started");

        let exporter = self.exporter.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let exporter = exporter.clone();
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_request(stream, &exporter).await {
                                warn!(client = %addr, error = %e, "Error handling metrics request");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept metrics connection");
                    }
                }
            }
        });

        Ok((local_addr, handle))
    }

    async fn handle_request(
        mut stream: TcpStream,
        exporter: &Exporter,
    ) -> Result<(), std::io::Error> {
        let mut buffer = [0; 8192];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            return Ok(());
        }

        let request = String::from_utf8_lossy(&buffer[..n]);
        let mut lines = request.lines();

        let Some(request_line) = lines.next() else {
            return Self::send_response(&mut stream, 400, "Bad Request", b"", None).await;
        };
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return Self::send_response(&mut stream, 400, "Bad Request", b"", None).await;
        }

        let method = parts[0];
        let path = parts[1].split('?').next().unwrap_or_default();

        if method != "GET" {
            return Self::send_response(&mut stream, 405, "Method Not Allowed", b"", None).await;
        }

        match path {
            METRICS_PATH => {
                let timeout = scrape_timeout(lines, &exporter.config().global);
                debug!(timeout_ms = timeout.as_millis() as u64, "Serving scrape");
                let body = exporter.render(timeout).await;
                Self::send_response(
                    &mut stream,
                    200,
                    "OK",
                    body.as_bytes(),
                    Some(TEXT_CONTENT_TYPE),
                )
                .await
            }
            HEALTH_PATH => {
                Self::send_response(&mut stream, 200, "OK", b"OK", Some("text/plain")).await
            }
            "/" => {
                Self::send_response(
                    &mut stream,
                    200,
                    "OK",
                    LANDING_PAGE.as_bytes(),
                    Some("text/html; charset=utf-8"),
                )
                .await
            }
            _ => Self::send_response(&mut stream, 404, "Not Found", b"", None).await,
        }
    }

    async fn send_response(
        stream: &mut TcpStream,
        status_code: u16,
        status_text: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), std::io::Error> {
        let content_type_header = content_type
            .map(|ct| format!("Content-Type: {}\r\n", ct))
            .unwrap_or_default();

        let response = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             {}\
             \r\n",
            status_code,
            status_text,
            body.len(),
            content_type_header
        );

        stream.write_all(response.as_bytes()).await?;
        stream.write_all(body).await?;
        stream.flush().await?;

        Ok(())
    }
}

/// Timeout for one scrape: the advertised Prometheus timeout minus the configured
/// offset, never above the global scrape timeout
fn scrape_timeout<'a>(headers: impl Iterator<Item = &'a str>, global: &GlobalConfig) -> Duration {
    let limit = global.scrape_timeout();

    let advertised = headers
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(SCRAPE_TIMEOUT_HEADER))
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0);

    match advertised {
        Some(secs) => {
            let timeout =
                Duration::from_secs_f64(secs).saturating_sub(global.scrape_timeout_offset());
            if timeout.is_zero() {
                limit
            } else {
                timeout.min(limit)
            }
        }
        None => limit,
    }
}
