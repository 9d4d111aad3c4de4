//! SSH module - session establishment over russh
//!
//! # Features
//! - Password and key-pair authentication
//! - Exec channels (scp sink) and SFTP subsystem channels
//! - Known-hosts file materialization for key-pair setups
//!
//! Host key checking is intentionally disabled (`StrictHostKeyChecking no`
//! semantics); see [`client::ClientHandler`].

mod client;
pub mod known_hosts;
mod session;

pub use client::{ClientHandler, SshClient};
pub use known_hosts::{ensure_known_hosts, known_hosts_path};
pub use session::SshSession;
