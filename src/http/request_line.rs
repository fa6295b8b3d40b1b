use crate::http::{
    headers::{find_crlf, is_token},
    request::HttpError,
};

/// The only protocol accepted on the request line.
const SUPPORTED_VERSION: &str = "1.1";

/// A Http Request Line representation with method, target and http version
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestLine {
    /// The method of the parsed request
    pub method: String,
    /// The target of the request, exactly as sent. Nothing is decoded.
    pub request_target: String,
    /// The HTTP version used in the request, without the `HTTP/` prefix. Always `1.1`.
    pub http_version: String,
}

/// Parses the request line at the start of `data`.
///
/// Returns None together with a size of 0 if `data` does not yet contain a full CRLF
/// terminated line. Otherwise returns the request line and the number of bytes it occupied,
/// including the CRLF.
///
/// # Errors
///
/// Throws `HttpError::MalformedRequestLine` if the line does not consist of exactly three
/// single-space separated parts or if the version is anything other than `HTTP/1.1`.
/// Throws `HttpError::InvalidMethod` if the method is not a token.
pub fn parse_request_line(data: &[u8]) -> Result<(Option<RequestLine>, usize), HttpError> {
    const CRLF_LEN: usize = 2;

    let Some(idx) = find_crlf(data) else {
        return Ok((None, 0));
    };

    let first = std::str::from_utf8(&data[..idx]).map_err(|_| HttpError::MalformedRequestLine)?;
    let parts: Vec<&str> = first.split(' ').collect();

    // Also ensures below [i] checks cannot panic
    if parts.len() != 3 {
        return Err(HttpError::MalformedRequestLine);
    }

    let (method, request_target, version) = (parts[0], parts[1], parts[2]);

    if request_target.is_empty() {
        return Err(HttpError::MalformedRequestLine);
    }

    match version.split_once('/') {
        Some(("HTTP", SUPPORTED_VERSION)) => {}
        _ => return Err(HttpError::MalformedRequestLine),
    }

    if !is_token(method.as_bytes()) {
        return Err(HttpError::InvalidMethod(method.to_string()));
    }

    let request_line = RequestLine {
        method: method.to_string(),
        request_target: request_target.to_string(),
        http_version: SUPPORTED_VERSION.to_string(),
    };

    Ok((Some(request_line), idx + CRLF_LEN))
}
