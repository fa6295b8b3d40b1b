/// Module containing the header table and header block parsing
pub mod headers;
/// Module containing logic to parse HTTP request lines
pub mod request_line;
/// Module containing logic to parse requests
pub mod request;
/// Module writing responses onto the wire.
pub mod response;
