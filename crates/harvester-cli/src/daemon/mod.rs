//! Daemon process: the controller loop plus the producer socket.

pub mod client;
pub mod controller;
pub mod devices;
pub mod paths;
pub mod server;
pub mod state;
pub mod stop;

// Public API - used by main.rs
pub use client::DaemonClient;
pub use controller::Controller;
pub use server::DaemonServer;
