use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::{
    headers::Headers,
    request_line::{RequestLine, parse_request_line},
    response::WriterState,
};

/// Size of the scratch buffer each read from the underlying stream fills.
const READ_CHUNK_SIZE: usize = 1024;

/// Representation of a HTTP request with request line, headers and body
///
/// Includes a parse state to keep track of the progress of the parsing
#[derive(Debug, Default)]
pub struct Request {
    /// The state of the parser.
    parse_state: ParseState,
    /// A custom struct representing the request line.
    pub request_line: RequestLine,
    /// A custom struct representing a list of headers.
    pub headers: Headers,
    /// The request body (can be empty). Never longer than the announced `Content-Length`.
    pub body: Vec<u8>,
}

/// Represents the different stages of the parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseState {
    /// The parser was initialized and waits for the request line.
    #[default]
    Initialized,
    /// The parser is parsing headers.
    ParsingHeaders,
    /// The parser is collecting `Content-Length` bytes of body.
    ParsingBody,
    /// The parser finished parsing.
    Done,
    /// The input was malformed. Terminal.
    Error,
}

/// Represents the kind of error that can occur while parsing a request or writing a response
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request line is not `<method> <target> HTTP/1.1`.
    #[error("request line is malformed")]
    MalformedRequestLine,

    /// The request method is not a token.
    #[error("invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    /// A header line has no colon, an empty name, or whitespace before the colon.
    #[error("header field is malformed")]
    MalformedHeaderField,

    /// A header name contains characters outside the token set.
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// The stream ended before the request line and headers were complete.
    #[error("unexpected end of file")]
    UnexpectedEof,

    /// The stream ended before `Content-Length` bytes of body arrived.
    #[error("body ended after {received} of {expected} bytes")]
    IncompleteBody {
        /// The announced `Content-Length`.
        expected: usize,
        /// The number of body bytes that actually arrived.
        received: usize,
    },

    /// A response write was attempted out of order.
    #[error("cannot write {operation} while the response is {state:?}")]
    WriterOutOfOrder {
        /// The attempted write.
        operation: &'static str,
        /// The state of the response at that point.
        state: WriterState,
    },

    /// Chunks or trailers were written for a response whose body is not chunked.
    #[error("response body is not chunked")]
    NotChunked,

    /// There was a generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated.
    /// This is most likely used as a safety net to catch errors that logically should not be able to happen.
    #[error("Internal invariant violated")]
    InternalInvariantViolated,
}

/// Parses the contents of a reader to a Request
///
/// Reads into a fixed scratch buffer, queues the bytes and hands everything not yet consumed
/// to the parser until it reaches a terminal state. This is the only place that waits on I/O.
///
/// # Errors
///
/// Throws `HttpError::IncompleteBody` if the reader ends while the body is still short of
/// `Content-Length`, `HttpError::UnexpectedEof` if it ends earlier than that, any parse error
/// produced by [`Request::parse`], and read failures unchanged as `HttpError::Io`.
pub async fn request_from_reader<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, HttpError> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut scratch = [0u8; READ_CHUNK_SIZE];
    let mut request = Request::new();

    loop {
        let parsed = request.parse(&buffer)?;
        buffer.advance(parsed);

        match request.parse_state {
            ParseState::Done => return Ok(request),
            ParseState::Error => return Err(HttpError::InternalInvariantViolated),
            ParseState::Initialized | ParseState::ParsingHeaders | ParseState::ParsingBody => {}
        }

        let read = reader.read(&mut scratch).await?;
        if read == 0 {
            return Err(match request.parse_state {
                ParseState::ParsingBody => HttpError::IncompleteBody {
                    expected: request.content_length(),
                    received: request.body.len(),
                },
                _ => HttpError::UnexpectedEof,
            });
        }

        buffer.extend_from_slice(&scratch[..read]);
    }
}

impl Request {
    /// Creates an empty request waiting for its request line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current parse state.
    #[must_use]
    pub const fn state(&self) -> ParseState {
        self.parse_state
    }

    /// Returns true once the parser reached a terminal state, successfully or not.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.parse_state, ParseState::Done | ParseState::Error)
    }

    /// The announced body length. A missing or unparseable `Content-Length` counts as 0.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.headers
            .get("content-length")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Parses as much of `data` as is currently possible.
    ///
    /// Walks through as many states as the available bytes allow and returns the total number
    /// of bytes consumed. The caller drops that many bytes from the front of its buffer and
    /// passes the remainder, extended by newly read bytes, on the next call. Stops without an
    /// error when the next structural element is not complete yet. Never blocks and never
    /// buffers input itself; once `Done` or `Error` is reached nothing more is consumed.
    ///
    /// # Errors
    ///
    /// Throws an `HttpError` if the input is malformed. The request then stays in the
    /// `Error` state and further calls consume nothing.
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, HttpError> {
        let result = self.parse_states(data);
        if result.is_err() {
            self.parse_state = ParseState::Error;
        }
        result
    }

    fn parse_states(&mut self, data: &[u8]) -> Result<usize, HttpError> {
        let mut total_size = 0;

        loop {
            let current = &data[total_size..];
            match self.parse_state {
                ParseState::Initialized => {
                    let (request_line, size) = parse_request_line(current)?;
                    let Some(request_line) = request_line else {
                        return Ok(total_size);
                    };
                    self.request_line = request_line;
                    self.parse_state = ParseState::ParsingHeaders;
                    total_size += size;
                }
                ParseState::ParsingHeaders => {
                    let (size, done) = self.headers.parse(current)?;
                    total_size += size;
                    if !done {
                        return Ok(total_size);
                    }
                    self.parse_state = if self.content_length() > 0 {
                        ParseState::ParsingBody
                    } else {
                        ParseState::Done
                    };
                }
                ParseState::ParsingBody => {
                    let content_length = self.content_length();
                    let remaining = content_length
                        .saturating_sub(self.body.len())
                        .min(current.len());
                    if remaining == 0 && self.body.len() < content_length {
                        return Ok(total_size);
                    }

                    self.body.extend_from_slice(&current[..remaining]);
                    total_size += remaining;

                    if self.body.len() == content_length {
                        self.parse_state = ParseState::Done;
                    }
                }
                ParseState::Done | ParseState::Error => return Ok(total_size),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    use crate::http::request::{HttpError, ParseState, Request, request_from_reader};

    pub struct ChunkReader<'a> {
        data: &'a [u8],
        num_bytes_per_read: usize,
        pos: usize,
    }

    impl<'a> ChunkReader<'a> {
        pub fn new(data: &'a str, num_bytes_per_read: usize) -> Self {
            Self {
                data: data.as_bytes(),
                num_bytes_per_read: num_bytes_per_read.max(1),
                pos: 0,
            }
        }
    }

    impl AsyncRead for ChunkReader<'_> {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.pos >= self.data.len() {
                return Poll::Ready(Ok(()));
            }

            let remaining = self.data.len() - self.pos;
            let max_take = self.num_bytes_per_read.min(remaining);
            let max_take = max_take.min(buf.remaining());

            if max_take == 0 {
                return Poll::Ready(Ok(()));
            }

            let chunk = &self.data[self.pos..self.pos + max_take];
            buf.put_slice(chunk);

            self.pos += max_take;

            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn get_request_line_valid() {
        let input = "GET / HTTP/1.1\r\n\
             Host: localhost:8080\r\n\
             User-Agent: curl/7.81.0\r\n\
             Accept: */*\r\n\
             \r\n";
        let mut chunk_reader = ChunkReader::new(input, 7);
        let mut buffered: BufReader<&mut ChunkReader<'_>> = BufReader::new(&mut chunk_reader);
        let r = request_from_reader(&mut buffered).await.unwrap();

        assert_eq!(r.request_line.method, "GET");
        assert_eq!(r.request_line.request_target, "/");
        assert_eq!(r.request_line.http_version, "1.1");
        assert_eq!(r.state(), ParseState::Done);
    }

    #[tokio::test]
    async fn post_request_with_body_valid() {
        let input = "POST /coffee HTTP/1.1\r\n\
             Host: localhost:8080\r\n\
             User-Agent: curl/7.81.0\r\n\
             Accept: */*\r\n\
             Content-Length: 17\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             flavor: dark mode";

        let mut chunk_reader = ChunkReader::new(input, 500);
        let r = request_from_reader(&mut chunk_reader).await.unwrap();

        assert_eq!(r.request_line.method, "POST");
        assert_eq!(r.request_line.request_target, "/coffee");
        assert_eq!(r.headers.get("content-type"), Some("text/plain"));
        assert_eq!(r.body, b"flavor: dark mode");
    }

    #[tokio::test]
    async fn three_uneven_chunks_parse_to_done() {
        let mut mock = tokio_test::io::Builder::new()
            .read(b"GET /")
            .read(b"foo HTTP/1")
            .read(b".1\r\nHost: a\r\n\r\n")
            .build();

        let r = request_from_reader(&mut mock).await.unwrap();

        assert_eq!(r.request_line.method, "GET");
        assert_eq!(r.request_line.request_target, "/foo");
        assert_eq!(r.headers.get("Host"), Some("a"));
        assert_eq!(r.state(), ParseState::Done);
        assert!(r.body.is_empty());
    }

    #[tokio::test]
    async fn every_read_size_yields_the_same_request() {
        let input = "PUT /items/7 HTTP/1.1\r\n\
             Host: localhost:8080\r\n\
             X-Tag: a\r\n\
             X-Tag: b\r\n\
             Content-Length: 11\r\n\
             \r\n\
             hello world";

        for size in 1..=input.len() {
            let mut chunk_reader = ChunkReader::new(input, size);
            let r = request_from_reader(&mut chunk_reader).await.unwrap();

            assert_eq!(r.request_line.method, "PUT", "read size {size}");
            assert_eq!(r.request_line.request_target, "/items/7");
            assert_eq!(r.headers.get("x-tag"), Some("a, b"));
            assert_eq!(r.body, b"hello world", "read size {size}");
        }
    }

    #[test]
    fn request_line_split_in_two_calls_matches_single_call() {
        let input = b"DELETE /things/42 HTTP/1.1\r\n";

        let mut whole = Request::new();
        assert_eq!(whole.parse(input).unwrap(), input.len());

        for split in 0..input.len() {
            let mut request = Request::new();
            let first = request.parse(&input[..split]).unwrap();
            assert_eq!(first, 0);
            let second = request.parse(&input[first..]).unwrap();
            assert_eq!(second, input.len());
            assert_eq!(request.request_line, whole.request_line);
            assert_eq!(request.state(), ParseState::ParsingHeaders);
        }
    }

    #[tokio::test]
    async fn invalid_number_of_requestline_parts_should_throw_malformedrequestline() {
        let input = "/coffee HTTP/1.1\r\n\
             Host: localhost:8080\r\n\
             \r\n";

        let mut chunk_reader = ChunkReader::new(input, 1);
        let result = request_from_reader(&mut chunk_reader).await;

        assert!(
            matches!(result, Err(HttpError::MalformedRequestLine)),
            "Expected Err(HttpError::MalformedRequestLine), got {result:?}"
        );
    }

    #[tokio::test]
    async fn invalid_http_version_should_throw_malformedrequestline() {
        let input = "GET / HTTP/1.2\r\n\
             Host: localhost:8080\r\n\
             \r\n";

        let mut chunk_reader = ChunkReader::new(input, 8);
        let result = request_from_reader(&mut chunk_reader).await;

        assert!(
            matches!(result, Err(HttpError::MalformedRequestLine)),
            "Expected Err(HttpError::MalformedRequestLine), got {result:?}"
        );
    }

    #[tokio::test]
    async fn invalid_request_line_order_should_throw_malformedrequestline() {
        let input = "HTTP/1.1 / GET\r\n\
             Host: localhost:8080\r\n\
             \r\n";

        let mut chunk_reader = ChunkReader::new(input, 15);
        let result = request_from_reader(&mut chunk_reader).await;

        assert!(
            matches!(result, Err(HttpError::MalformedRequestLine)),
            "Expected Err(HttpError::MalformedRequestLine), got {result:?}"
        );
    }

    #[tokio::test]
    async fn request_with_extra_spaces_should_throw_malformedrequestline() {
        let input = "GET  /  HTTP/1.1\r\n\
            Host: localhost:8080\r\n\
            \r\n";

        let mut chunk_reader = ChunkReader::new(input, 15);
        let result = request_from_reader(&mut chunk_reader).await;

        assert!(
            matches!(result, Err(HttpError::MalformedRequestLine)),
            "Expected Err(HttpError::MalformedRequestLine), got {result:?}"
        );
    }

    #[tokio::test]
    async fn incomplete_request_should_throw_unexpectedeof() {
        let input = "GET / HTTP/1.1";
        let mut reader = input.as_bytes();

        let result = request_from_reader(&mut reader).await;

        assert!(matches!(result, Err(HttpError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn valid_headers() {
        let input = "GET / HTTP/1.1\r\nHost: localhost:8080\r\nUser-Agent: curl/7.81.0\r\nAccept: */*\r\n\r\n";
        let mut chunk_reader = ChunkReader::new(input, 7);
        let r = request_from_reader(&mut chunk_reader).await.unwrap();

        assert_eq!(r.headers.get("host").unwrap(), "localhost:8080");
        assert_eq!(r.headers.get("user-agent").unwrap(), "curl/7.81.0");
        assert_eq!(r.headers.get("accept").unwrap(), "*/*");
    }

    #[tokio::test]
    async fn request_with_malformed_headers_throws_malformedheaderfield() {
        let input = "GET / HTTP/1.1\r\nHost localhost\r\n\r\n";
        let mut chunk_reader = ChunkReader::new(input, 7);
        let r = request_from_reader(&mut chunk_reader).await;

        assert!(matches!(r, Err(HttpError::MalformedHeaderField)));
    }

    #[tokio::test]
    async fn header_name_ends_at_the_first_colon() {
        let input = "GET / HTTP/1.1\r\nHost localhost:8080\r\n\r\n";
        let mut chunk_reader = ChunkReader::new(input, 7);
        let r = request_from_reader(&mut chunk_reader).await;

        assert!(matches!(r, Err(HttpError::InvalidHeaderName(_))), "got {r:?}");
    }

    #[test]
    fn error_state_is_terminal() {
        let mut request = Request::new();
        let result = request.parse(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n");

        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
        assert_eq!(request.state(), ParseState::Error);
        assert!(request.is_complete());
        assert_eq!(request.parse(b"Host: a\r\n\r\n").unwrap(), 0);
        assert_eq!(request.state(), ParseState::Error);
    }

    ///////////////////////// BODY TESTS /////////////////////////////////////////////////////////

    #[tokio::test]
    async fn body_valid() {
        let input = "\
            POST /st HTTP/1.1\r\n\
                        Host: localhost:8080\r\n\
                        Content-Length: 12\r\n\
                        \r\n\
                        hello world!";

        let mut chunk_reader = ChunkReader::new(input, 32);
        let mut buffered: BufReader<&mut ChunkReader<'_>> = BufReader::new(&mut chunk_reader);
        let r = request_from_reader(&mut buffered).await.unwrap();

        assert_eq!(String::from_utf8(r.body).unwrap(), "hello world!");
    }

    #[tokio::test]
    async fn body_shorter_than_content_length_should_throw_incompletebody() {
        let input = "\
            POST /st HTTP/1.1\r\n\
                        Host: localhost:8080\r\n\
                        Content-Length: 20\r\n\
                        \r\n\
                        hello world!";

        let mut chunk_reader = ChunkReader::new(input, 32);
        let r = request_from_reader(&mut chunk_reader).await;

        assert!(
            matches!(r, Err(HttpError::IncompleteBody { expected: 20, received: 12 })),
            "Expected Err(HttpError::IncompleteBody), got {r:?}"
        );
    }

    #[tokio::test]
    async fn read_failure_propagates_unchanged() {
        let mut mock = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let r = request_from_reader(&mut mock).await;

        assert!(matches!(r, Err(HttpError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn empty_body_with_zero_content_length_valid() {
        let input = "\
            POST /st HTTP/1.1\r\n\
                        Host: localhost:8080\r\n\
                        Content-Length: 0\r\n\
                        \r\n\
                        ";

        let mut chunk_reader = ChunkReader::new(input, 32);
        let request = request_from_reader(&mut chunk_reader).await.unwrap();

        assert!(request.body.is_empty());
        assert_eq!(request.state(), ParseState::Done);
    }

    #[tokio::test]
    async fn unparseable_content_length_counts_as_zero() {
        let input = "POST /st HTTP/1.1\r\nContent-Length: lots\r\n\r\nhello";

        let mut chunk_reader = ChunkReader::new(input, 32);
        let request = request_from_reader(&mut chunk_reader).await.unwrap();

        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn body_longer_than_content_length_is_truncated() {
        let input = "\
            POST /st HTTP/1.1\r\n\
                        Host: localhost:8080\r\n\
                        Content-Length: 5\r\n\
                        \r\n\
                        hello world!";

        let mut chunk_reader = ChunkReader::new(input, 30);
        let request = request_from_reader(&mut chunk_reader).await.unwrap();

        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn parse_leaves_bytes_past_the_body_unconsumed() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef";
        let mut request = Request::new();

        let consumed = request.parse(input).unwrap();

        assert_eq!(consumed, input.len() - 3);
        assert_eq!(request.body, b"abc");
        assert_eq!(request.parse(&input[consumed..]).unwrap(), 0);
    }

    #[tokio::test]
    async fn no_content_length_but_body_exists_valid() {
        let input = "\
            POST /st HTTP/1.1\r\n\
                        Host: localhost:8080\r\n\
                        \r\n\
                        hello world!";

        let mut chunk_reader = ChunkReader::new(input, 32);
        let request = request_from_reader(&mut chunk_reader).await.unwrap();

        assert!(request.body.is_empty());
    }
}
