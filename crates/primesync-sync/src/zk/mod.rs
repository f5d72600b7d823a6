//! # ZK Terminal Protocol
//!
//! TCP implementation of [`TerminalTransport`](crate::transport::TerminalTransport)
//! for ZK-compatible attendance terminals (port 4370 by default).
//!
//! ## Module Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  client.rs   ZkTransport / ZkSession: handshake, buffered reads,       │
//! │              user writes, exit                                          │
//! │       │                                                                 │
//! │       ├──► packet.rs   framing, checksum, reply counter, comm key      │
//! │       └──► records.rs  user / attendance record layouts, timestamps    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the subset of the protocol the reconcilers need is implemented:
//! connect/auth, user and attendance table reads, user writes. Fingerprint
//! templates, live capture and UDP framing are not supported.

pub mod client;
pub mod packet;
pub mod records;

pub use client::{ZkSession, ZkTransport};
