//! Daemon process hosting navigation sessions.

pub mod client;
pub mod paths;
pub mod server;
pub mod session;

// Public API - used by main.rs
pub use client::DaemonClient;
pub use server::DaemonServer;
