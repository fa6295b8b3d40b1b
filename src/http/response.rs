use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::{headers::Headers, request::HttpError};

/// Enum containing the valid status codes used in this application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// 200
    Ok = 200,
    /// 201
    Created = 201,
    /// 400
    BadRequest = 400,
    /// 404
    NotFound = 404,
    /// 500
    InternalServerError = 500,
}

/// Implements Display for the Status Code to enable formatting the Codes as integer values.
impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl StatusCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Creates the string representation of the passed status code.
    #[must_use]
    pub const fn reason_phrase(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// Tracks what a [`ResponseWriter`] may write next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing has been written yet.
    AwaitingStatusLine,
    /// The status line is out, headers come next.
    AwaitingHeaders,
    /// Headers are out. Body bytes, and trailers for a chunked body, may follow.
    AwaitingBody,
    /// The response is complete. Nothing more may be written.
    Closed,
}

/// Returns the baseline headers of a response with a body of `content_length` bytes.
///
/// # Examples
/// ```
/// let headers = httpwire::http::response::default_headers(5);
/// assert_eq!(headers.get("content-length"), Some("5"));
/// assert_eq!(headers.get("connection"), Some("close"));
/// ```
#[must_use]
pub fn default_headers(content_length: usize) -> Headers {
    let mut headers = Headers::new();
    headers.replace("Content-Length", content_length.to_string());
    headers.replace("Connection", "close");
    headers.replace("Content-Type", "text/plain");
    headers
}

/// Writes a single HTTP/1.1 response onto a byte sink, in protocol order.
///
/// The status line comes first, then the header block, then any number of body writes.
/// Every write is rejected with `HttpError::WriterOutOfOrder` when it arrives out of turn.
///
/// A chunked body is framed by the caller on top of [`ResponseWriter::write_body`], or with
/// the [`ResponseWriter::write_chunk`] helpers. Once the body is finished, a second call to
/// [`ResponseWriter::write_headers`] emits the trailer block and closes the response. That
/// second call is only accepted when the first header block declared
/// `Transfer-Encoding: chunked`.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
    state: WriterState,
    chunked: bool,
    last_chunk_written: bool,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Creates a writer for a fresh response on `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            state: WriterState::AwaitingStatusLine,
            chunked: false,
            last_chunk_written: false,
        }
    }

    /// Returns what the writer expects next.
    #[must_use]
    pub const fn state(&self) -> WriterState {
        self.state
    }

    /// Writes the status line to the underlying writer.
    ///
    /// Hardcodes HTTP/1.1 due to the limit of the Server to that version.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::WriterOutOfOrder` if a status line was already written, or an I/O error.
    pub async fn write_status_line(&mut self, status_code: StatusCode) -> Result<(), HttpError> {
        self.expect_state(WriterState::AwaitingStatusLine, "status line")?;
        let line = format!(
            "HTTP/1.1 {} {}\r\n",
            status_code.as_u16(),
            status_code.reason_phrase()
        );
        self.writer.write_all(line.as_bytes()).await?;
        self.state = WriterState::AwaitingHeaders;
        Ok(())
    }

    /// Writes the header block, including the blank line that ends it.
    ///
    /// Called once after the status line. Called again after a chunked body, it writes the
    /// trailer block and closes the response.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::WriterOutOfOrder` before the status line or after the response was
    /// closed, `HttpError::NotChunked` for trailers after a body that is not chunked, or an
    /// I/O error.
    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), HttpError> {
        let next = match self.state {
            WriterState::AwaitingHeaders => WriterState::AwaitingBody,
            WriterState::AwaitingBody if self.chunked => WriterState::Closed,
            WriterState::AwaitingBody => return Err(HttpError::NotChunked),
            state @ (WriterState::AwaitingStatusLine | WriterState::Closed) => {
                return Err(HttpError::WriterOutOfOrder {
                    operation: "headers",
                    state,
                });
            }
        };

        let mut block = Vec::new();
        for (name, value) in headers {
            block.extend_from_slice(name.as_bytes());
            block.extend_from_slice(b": ");
            block.extend_from_slice(value.as_bytes());
            block.extend_from_slice(b"\r\n");
        }
        block.extend_from_slice(b"\r\n");
        self.writer.write_all(&block).await?;

        if self.state == WriterState::AwaitingHeaders {
            self.chunked = is_chunked(headers);
        }
        self.state = next;
        Ok(())
    }

    /// Writes raw body bytes verbatim. May be called any number of times.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::WriterOutOfOrder` unless the headers have been written and the
    /// response is still open, or an I/O error.
    pub async fn write_body(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.expect_state(WriterState::AwaitingBody, "body")?;
        self.writer.write_all(data).await?;
        Ok(())
    }

    /// Writes one chunk of a chunked body.
    ///
    /// # Output
    /// [Length in Hex]\r\n
    ///
    /// [Data]\r\n
    ///
    /// An empty `data` writes nothing, since a zero-length chunk ends the body.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::NotChunked` if the headers did not declare a chunked body,
    /// `HttpError::WriterOutOfOrder` once the body was ended, and otherwise the errors of
    /// [`ResponseWriter::write_body`].
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.expect_open_chunked_body("chunk")?;
        if data.is_empty() {
            return Ok(());
        }
        self.write_body(format!("{:x}\r\n", data.len()).as_bytes())
            .await?;
        self.write_body(data).await?;
        self.write_body(b"\r\n").await
    }

    /// Writes the zero-length chunk that ends a chunked body.
    ///
    /// Must be followed by [`ResponseWriter::write_trailers`], which also emits the final blank line.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseWriter::write_chunk`].
    pub async fn write_chunked_body_done(&mut self) -> Result<(), HttpError> {
        self.expect_open_chunked_body("last chunk")?;
        self.write_body(b"0\r\n").await?;
        self.last_chunk_written = true;
        Ok(())
    }

    /// A second `write_headers` call that also checks the body was ended with
    /// [`ResponseWriter::write_chunked_body_done`].
    ///
    /// Bodies framed by hand through [`ResponseWriter::write_body`] end with a plain second
    /// `write_headers` call instead.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::WriterOutOfOrder` before the zero-length chunk was written, and
    /// otherwise the errors of [`ResponseWriter::write_headers`].
    pub async fn write_trailers(&mut self, trailers: &Headers) -> Result<(), HttpError> {
        self.expect_chunked()?;
        if !self.last_chunk_written {
            return Err(HttpError::WriterOutOfOrder {
                operation: "trailers",
                state: self.state,
            });
        }
        self.write_headers(trailers).await
    }

    /// Writes a complete response: status line, the default headers with `content_type`, and `body`.
    ///
    /// Helper function to remove boilerplate for responses that are known up front.
    ///
    /// # Errors
    ///
    /// Same as the individual writes; the writer must not have started a response yet.
    pub async fn write_response(
        &mut self,
        status_code: StatusCode,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), HttpError> {
        let mut headers = default_headers(body.len());
        headers.replace("Content-Type", content_type);
        self.write_status_line(status_code).await?;
        self.write_headers(&headers).await?;
        self.write_body(body).await
    }

    /// Flushes the underlying writer and closes the response.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if flushing fails.
    pub async fn finish(&mut self) -> Result<(), HttpError> {
        self.writer.flush().await?;
        self.state = WriterState::Closed;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn expect_state(&self, expected: WriterState, operation: &'static str) -> Result<(), HttpError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HttpError::WriterOutOfOrder {
                operation,
                state: self.state,
            })
        }
    }

    fn expect_chunked(&self) -> Result<(), HttpError> {
        self.expect_state(WriterState::AwaitingBody, "chunk")?;
        if self.chunked {
            Ok(())
        } else {
            Err(HttpError::NotChunked)
        }
    }

    fn expect_open_chunked_body(&self, operation: &'static str) -> Result<(), HttpError> {
        self.expect_chunked()?;
        if self.last_chunk_written {
            Err(HttpError::WriterOutOfOrder {
                operation,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }
}

/// Chunked is only in effect when it is the last transfer coding applied.
fn is_chunked(headers: &Headers) -> bool {
    headers
        .get("transfer-encoding")
        .and_then(|codings| codings.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}
