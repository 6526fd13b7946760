//! Framing layer for the switchboard tunnel.
//!
//! A tunnel carries multiplexed logical messages between an agent and a
//! proxy over any ordered, reliable byte stream. This crate owns the wire
//! format: the 18-byte frame header, the logical message model, and the
//! [`Connection`] type that fragments outgoing messages and reassembles
//! incoming ones.
//!
//! The authentication handshake that runs on top of this layer lives in
//! `switchboard-auth`.

#![deny(unsafe_code)]

mod cancel;
mod conn;
mod error;
mod flags;
mod frame;
mod limits;
mod message;

pub use cancel::*;
pub use conn::*;
pub use error::*;
pub use flags::*;
pub use frame::*;
pub use limits::*;
pub use message::*;
