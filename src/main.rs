//! # HTTP wire demo server
//!
//! This binary crate serves a small demo handler built on top of the library in this crate.
//!
//! Refer to the library documentation for the reusable components.
use std::{io, sync::Arc};

use sha2::{Digest, Sha256};
use tokio::{
    io::AsyncWrite,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use httpwire::{
    config::ServerConfig,
    http::{
        headers::Headers,
        request::Request,
        response::{ResponseWriter, StatusCode, default_headers},
    },
    runtime::{
        handler::{Handler, HandlerError},
        server::serve_on,
    },
};

const HTTPBIN_PREFIX: &str = "/httpbin/";

struct DemoHandler {
    client: reqwest::Client,
}

/**
 * Example Implementation. This is more to showcase usage rather than be a realistic depiction of the server's usage.
 */
impl Handler for DemoHandler {
    async fn call<W: AsyncWrite + Unpin + Send>(
        &self,
        request: &Request,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), HandlerError> {
        match request.request_line.request_target.as_str() {
            "/yourproblem" => {
                let body = "<html><body><h1>Bad Request</h1><p>Your request honestly kinda sucked.</p></body></html>";
                writer.write_response(StatusCode::BadRequest, "text/html", body.as_bytes()).await?;
            }
            "/myproblem" => {
                return Err(HandlerError::new(
                    StatusCode::InternalServerError,
                    "Okay, you know what? This one is on me.",
                ));
            }
            "/video" => {
                let file = tokio::fs::read("assets/vim.mp4").await?;
                writer.write_response(StatusCode::Ok, "video/mp4", &file).await?;
            }
            path if path.starts_with(HTTPBIN_PREFIX) => {
                let suffix = &path[HTTPBIN_PREFIX.len()..];
                self.proxy_httpbin(suffix, writer).await?;
            }
            _ => {
                let body = "<html><body><h1>Success!</h1><p>Your request was an absolute banger.</p></body></html>";
                writer.write_response(StatusCode::Ok, "text/html", body.as_bytes()).await?;
            }
        }
        Ok(())
    }
}

impl DemoHandler {
    /// Streams an httpbin.org response back as a chunked body, with its hash and length as trailers.
    async fn proxy_httpbin<W: AsyncWrite + Unpin + Send>(
        &self,
        path: &str,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), HandlerError> {
        let url = format!("https://httpbin.org/{path}");
        let mut upstream = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!("upstream request to {url} failed: {e}");
            HandlerError::new(StatusCode::InternalServerError, "upstream request failed")
        })?;

        let mut headers = default_headers(0);
        headers.delete("Content-Length");
        headers.replace("Transfer-Encoding", "chunked");
        headers.set("Trailer", "X-Content-SHA256");
        headers.set("Trailer", "X-Content-Length");
        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&headers).await?;

        let mut hasher = Sha256::new();
        let mut length = 0;
        loop {
            match upstream.chunk().await {
                Ok(Some(chunk)) => {
                    hasher.update(&chunk);
                    length += chunk.len();
                    writer.write_chunk(&chunk).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    // the status line is already out, so the peer only sees a short body
                    tracing::warn!("upstream body from {url} failed: {e}");
                    break;
                }
            }
        }
        writer.write_chunked_body_done().await?;

        let mut trailers = Headers::new();
        trailers.replace("X-Content-SHA256", hex::encode(hasher.finalize()));
        trailers.replace("X-Content-Length", length.to_string());
        writer.write_trailers(&trailers).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let handler = DemoHandler {
        client: reqwest::Client::new(),
    };
    let server = serve_on((config.host.as_str(), config.port), Arc::new(handler)).await?;
    info!("Server started on {}", server.local_addr());

    stop_signal()?.await?;
    server.shutdown().await;
    info!("Server gracefully stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns, so a signal that arrives before the
/// future is polled is not lost.
fn stop_signal() -> io::Result<impl Future<Output = io::Result<()>>> {
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            result = ctrl_c() => result,
            _ = terminate.recv() => {
                info!("received SIGTERM");
                Ok(())
            }
        }
    })
}
