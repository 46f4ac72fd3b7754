//! netbin: an ephemeral in-memory pastebin.
//!
//! Pastes are submitted over a raw TCP connection (netcat-style: write
//! the body, close the write side) and read back over HTTP by key.
//!
//! Features:
//! - Random six-symbol keys, never reused within a process
//! - 2 MiB paste cap and blank-paste rejection at the ingestion edge
//! - In-memory storage only; contents vanish on restart
//! - Configuration via CLI arguments or TOML file

pub mod config;
pub mod http;
pub mod keygen;
pub mod store;
pub mod tcp;
