//! Authenticated tunnel between a developer-machine agent and a public
//! proxy.
//!
//! This facade re-exports the three layers:
//!
//! - [`switchboard_core`]: frame codec, logical messages, and the
//!   fragmenting [`Connection`].
//! - [`switchboard_identity`]: the persisted Ed25519 keypair and the
//!   agent id derived from it.
//! - [`switchboard_auth`]: the challenge-response handshake binding a
//!   connection to an agent identity.
//!
//! A minimal agent looks like:
//!
//! ```no_run
//! use switchboard::{
//!     AgentIdentity, CancelToken, Connection, HandshakeConfig, KeyPaths, Message,
//!     authenticate_as_client,
//! };
//!
//! # async fn run(stream: tokio::io::DuplexStream) -> Result<(), Box<dyn std::error::Error>> {
//! let identity = AgentIdentity::load_or_generate(&KeyPaths::resolve()?)?;
//! let conn = Connection::new(stream);
//! let session = authenticate_as_client(&conn, &identity, &HandshakeConfig::default()).await?;
//! println!("authenticated as {}", session.agent_id);
//!
//! let token = CancelToken::new();
//! conn.send(&Message::request(1, &b"hello"[..]), &token).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

// Framing layer
pub use switchboard_core::{
    AuthStage,
    CancelCause,
    CancelToken,
    ConfigError,
    ConnConfig,
    ConnError,
    Connection,
    DEFAULT_MAX_FRAME_PAYLOAD,
    ENVELOPE_LEN,
    Envelope,
    EnvelopeViolation,
    FRAME_HEADER_LEN,
    FRAME_MAGIC,
    FRAME_VERSION,
    FragmentViolation,
    Frame,
    FrameFlags,
    FrameHeader,
    FrameType,
    Message,
    PayloadFormat,
    PayloadKind,
    ProtocolError,
    read_frame,
    write_frame,
};

// Identity
pub use switchboard_identity::{
    AgentIdentity, IdentityError, KEY_PATH_ENV, KeyPaths, agent_id_from_key,
};

// Handshake
pub use switchboard_auth::{
    AgentRegistry, AuthCode, AuthError, AuthPayload, AuthenticatedAgent, ClientSession,
    HandshakeConfig, MemoryRegistry, authenticate_as_client, canonical_string,
    wait_for_agent_authentication,
};
