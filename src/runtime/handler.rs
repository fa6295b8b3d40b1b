use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::http::{
    request::{HttpError, Request},
    response::{ResponseWriter, StatusCode},
};

/// A failure reported by a [`Handler`].
///
/// If the handler has not written a status line yet, the server answers with `status` and
/// `message` as the body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status} {message}")]
pub struct HandlerError {
    /// The status line to answer with.
    pub status: StatusCode,
    /// The response body.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error answered with `status` and `message`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Transport and protocol failures inside a handler become a generic 500.
impl From<HttpError> for HandlerError {
    fn from(error: HttpError) -> Self {
        tracing::debug!("handler failed: {error}");
        Self::new(
            StatusCode::InternalServerError,
            StatusCode::InternalServerError.reason_phrase(),
        )
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        HttpError::Io(error).into()
    }
}

/// A trait that determines the handling for each server.
pub trait Handler: Send + Sync {
    /// Answers a parsed request by driving `writer` through status line, headers and body.
    ///
    /// # Errors
    /// Returns a `HandlerError` to have the server answer with its status and message instead.
    fn call<W: AsyncWrite + Unpin + Send>(
        &self,
        req: &Request,
        writer: &mut ResponseWriter<W>,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}
