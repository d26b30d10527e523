// Library root: configuration, wire protocol and the WebSocket surface, so
// integration tests can drive the server without the binary.

pub mod config;
pub mod protocol;
pub mod ws_server;
