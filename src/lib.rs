//! # HTTP wire
//!
//! HTTP/1.1 straight from TCP bytes.
//!
//! The [`http`] module holds the protocol layer: an incremental request parser that copes with
//! any read fragmentation, a case-insensitive header table, and a response writer that enforces
//! status line, headers and body order, including chunked bodies with trailers.
//! The [`runtime`] module serves a [`runtime::handler::Handler`] over TCP, one request per connection.
//!
//! Refer to the included binaries for a complete server implementation.
pub mod config;
pub mod http;
pub mod runtime;
