//! Agent identity: a persisted Ed25519 keypair and the stable agent id
//! derived from its public half.
//!
//! The keypair lives in two PEM files (PKCS#8 private, SPKI public). The
//! agent id is the lowercase hex SHA-256 of the raw 32-byte public key, so
//! identity survives restarts and never depends on process state.

#![deny(unsafe_code)]

mod error;
mod identity;
mod paths;

pub use error::*;
pub use identity::*;
pub use paths::*;
