//! # TCP listener
//!
//! Accepts connections one at a time, parses a single request from each and prints it.
//! Nothing is written back; the connection is closed once the request has been read.
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use httpwire::{config::ServerConfig, http::request::request_from_reader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (mut stream, peer) = listener.accept().await?;
        info!(%peer, "Connection established");

        let request = match request_from_reader(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                warn!(%peer, "could not read request: {e}");
                continue;
            }
        };

        println!("Request line:");
        println!("- Method: {}", request.request_line.method);
        println!("- Target: {}", request.request_line.request_target);
        println!("- Version: {}", request.request_line.http_version);
        println!("Headers:");
        for (name, value) in &request.headers {
            println!("- {name}: {value}");
        }
        println!("Body:");
        println!("{}", String::from_utf8_lossy(&request.body));
        info!(%peer, "Connection closed");
    }
}
