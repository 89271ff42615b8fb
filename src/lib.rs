//! OffGrid — a serverless mesh chat node: simultaneously a server
//! (accepting inbound links) and a client (dialing outbound links),
//! forwarding messages hop-by-hop across the mesh.
//!
//! Split into a library and a thin `main.rs` binary so integration tests
//! can drive the mesh engine over real `TcpTransport` loopback connections
//! without going through the TUI.

pub mod app;
pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod event;
pub mod frame;
pub mod gossip;
pub mod relay;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod ui;
