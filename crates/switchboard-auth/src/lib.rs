//! Challenge-response authentication for the switchboard tunnel.
//!
//! The handshake runs over one [`switchboard_core::Connection`] and binds
//! it to a stable agent identity: the client proves possession of the
//! Ed25519 key behind its `agent_id` by signing a server-issued challenge.
//! Payloads are UTF-8 JSON with a fixed `type`/`v` header; unknown fields
//! are tolerated for forward compatibility.

#![deny(unsafe_code)]

mod canonical;
mod client;
mod config;
mod error;
mod proto;
mod registry;
mod server;

pub use canonical::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use proto::*;
pub use registry::*;
pub use server::*;
