use std::{
    io::Error,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::Notify,
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::http::{
    request::{HttpError, request_from_reader},
    response::{ResponseWriter, StatusCode, WriterState},
};
use crate::runtime::handler::Handler;

const BAD_REQUEST_BODY: &str = "<html><body><h1>Bad Request</h1></body></html>";

/// A handle to a running server.
///
/// Dropping the handle does not stop the server; call [`Server::close`] or [`Server::shutdown`].
#[derive(Debug)]
pub struct Server {
    server_state: Arc<ServerState>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

/// The state shared between the handle and the accept loop: whether the server has been
/// closed, and a way to wake the accept loop when it is.
#[derive(Debug, Default)]
struct ServerState {
    closed: AtomicBool,
    shutdown: Notify,
}

impl Server {
    /// Stops accepting new connections. Idempotent.
    ///
    /// Connections that were already accepted are served to completion.
    pub fn close(&self) {
        if !self.server_state.closed.swap(true, Ordering::SeqCst) {
            self.server_state.shutdown.notify_one();
        }
    }

    /// Returns true once [`Server::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.server_state.is_closed()
    }

    /// The address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Closes the server and waits for the accept loop to exit, releasing the listening socket.
    pub async fn shutdown(self) {
        self.close();
        if let Err(e) = self.accept_task.await {
            error!("accept loop ended abnormally: {e}");
        }
    }
}

impl ServerState {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Accepts connections until the server is closed, spawning one task per connection.
    ///
    /// There is no limit on the number of connections served at once, and no read timeout:
    /// a peer that never finishes its request holds its task until it disconnects.
    async fn listen<H: Handler + 'static>(self: Arc<Self>, listener: TcpListener, handler: Arc<H>) {
        loop {
            if self.is_closed() {
                break;
            }

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                () = self.shutdown.notified() => break,
            };

            if self.is_closed() {
                debug!("dropping connection accepted after close");
                break;
            }

            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted connection");
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle(stream, &*handler).await {
                            warn!(%peer, "connection ended with error: {e}");
                        }
                    });
                }
                Err(error) => {
                    error!("Encountered error accepting connection: {error}");
                    sleep(Duration::from_millis(50)).await;
                }
            }
        }
        info!("server closed, no longer accepting connections");
    }
}

/// Serves the handler on `127.0.0.1:<port>`.
///
/// Returns as soon as the socket is bound; connections are accepted on a spawned task.
/// Port 0 binds an ephemeral port, see [`Server::local_addr`].
///
/// # Errors
///
/// Throws an Error if binding the tcp listener fails.
pub async fn serve<H: Handler + 'static>(port: u16, handler: Arc<H>) -> Result<Server, Error> {
    serve_on(("127.0.0.1", port), handler).await
}

/// Serves the handler on an explicit address.
///
/// # Errors
///
/// Throws an Error if binding the tcp listener fails.
pub async fn serve_on<A: ToSocketAddrs, H: Handler + 'static>(
    addr: A,
    handler: Arc<H>,
) -> Result<Server, Error> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let state = Arc::new(ServerState::default());
    let accept_task = tokio::spawn(Arc::clone(&state).listen(listener, handler));
    info!(%local_addr, "server listening");

    Ok(Server {
        server_state: state,
        local_addr,
        accept_task,
    })
}

/// Serves exactly one request on the connection, then closes it.
///
/// The stream is owned here, so it is closed exactly once whichever way this returns.
///
/// # Errors
///
/// Throws an `HttpError` if reading or writing the connection fails.
async fn handle<H: Handler>(mut stream: TcpStream, handler: &H) -> Result<(), HttpError> {
    let result = process_request(&mut stream, handler).await;
    if let Err(e) = stream.shutdown().await {
        debug!("shutting down connection: {e}");
    }
    result
}

/// Reads the request and lets the handler answer it.
///
/// Malformed requests are answered with a 400. When the peer went away mid-request, there is
/// nobody left to answer.
async fn process_request<H: Handler>(stream: &mut TcpStream, handler: &H) -> Result<(), HttpError> {
    let request = match request_from_reader(stream).await {
        Ok(request) => request,
        Err(e @ (HttpError::Io(_) | HttpError::UnexpectedEof | HttpError::IncompleteBody { .. })) => {
            return Err(e);
        }
        Err(e) => {
            debug!("rejecting malformed request: {e}");
            let mut writer = ResponseWriter::new(stream);
            writer
                .write_response(StatusCode::BadRequest, "text/html", BAD_REQUEST_BODY.as_bytes())
                .await?;
            return writer.finish().await;
        }
    };

    debug!(
        method = %request.request_line.method,
        target = %request.request_line.request_target,
        "handling request"
    );

    let mut writer = ResponseWriter::new(stream);
    if let Err(handler_error) = handler.call(&request, &mut writer).await {
        if writer.state() == WriterState::AwaitingStatusLine {
            info!("handler answered with {handler_error}");
            writer
                .write_response(handler_error.status, "text/plain", handler_error.message.as_bytes())
                .await?;
        } else {
            warn!("handler failed after starting its response: {handler_error}");
        }
    }
    writer.finish().await
}
