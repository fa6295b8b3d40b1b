/// Module containing the handler
pub mod handler;
/// Module containing the logic for the server
pub mod server;
