use std::fmt;

use crate::FrameType;

/// Violations of the frame-level wire contract.
///
/// Every variant is fatal to the connection: a desynchronized stream cannot
/// be recovered, so the receive path tears the endpoint down before
/// surfacing one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First two header bytes were not the frame magic.
    BadMagic { found: [u8; 2] },
    /// Version byte was not the supported protocol version.
    BadVersion { found: u8 },
    /// Type byte outside the defined set.
    UnknownType { found: u8 },
    /// A flag bit outside `START | END` was set.
    InvalidFlags { found: u16 },
    /// Declared payload length exceeds the connection's configured maximum.
    FrameTooLarge { len: u32, max: u32 },
    /// Stream id invalid for the frame type (non-zero for control/auth,
    /// zero for payload).
    InvalidStreamId {
        frame_type: FrameType,
        stream_id: u64,
    },
    /// Fragmentation discipline broken during reassembly.
    Fragment(FragmentViolation),
    /// Malformed payload-message envelope.
    Envelope(EnvelopeViolation),
}

/// How a frame sequence broke the START/END bracketing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentViolation {
    /// First frame observed did not carry `START`.
    MissingStart,
    /// A continuation frame carried `START`.
    UnexpectedStart,
    /// A continuation frame changed the message type.
    TypeChanged {
        expected: FrameType,
        found: FrameType,
    },
    /// A continuation frame changed the stream id.
    StreamChanged { expected: u64, found: u64 },
    /// A ping or pong frame was not a whole `START|END` frame.
    ControlFragmented,
    /// A ping or pong frame carried payload bytes.
    ControlPayload { len: u32 },
}

/// How a payload-message envelope failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeViolation {
    /// First fragment shorter than the 4-byte envelope.
    Truncated { len: u32 },
    /// Reserved bytes were not zero.
    ReservedBits { found: u16 },
    /// Format byte outside the defined set.
    UnknownFormat { found: u8 },
    /// Kind byte outside request/response/oneway.
    UnknownKind { found: u8 },
}

/// Why a blocking call returned early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The token was cancelled imperatively.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

/// Connection configuration rejected at point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_frame_payload` leaves no room past the payload envelope.
    MaxPayloadTooSmall { max: u32, min: u32 },
}

/// Error surface of [`crate::Connection`] operations.
#[derive(Debug)]
pub enum ConnError {
    /// The peer violated the wire protocol. The connection has been closed.
    Protocol(ProtocolError),
    /// The transport failed; the connection is left open for the caller to
    /// decide.
    Io(std::io::Error),
    /// The operation was interrupted by its cancellation token.
    Cancelled(CancelCause),
    /// The connection configuration is unusable for this operation.
    Config(ConfigError),
    /// The connection was already closed locally.
    Closed,
}

impl ConnError {
    /// True for protocol-class failures, which are fatal to the connection.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ConnError::Protocol(_))
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadMagic { found } => {
                write!(f, "bad frame magic {:02x}{:02x}", found[0], found[1])
            }
            ProtocolError::BadVersion { found } => {
                write!(f, "unsupported protocol version {found:#04x}")
            }
            ProtocolError::UnknownType { found } => write!(f, "unknown frame type {found:#04x}"),
            ProtocolError::InvalidFlags { found } => {
                write!(f, "undefined flag bits in {found:#06x}")
            }
            ProtocolError::FrameTooLarge { len, max } => {
                write!(f, "frame payload of {len} bytes exceeds maximum of {max}")
            }
            ProtocolError::InvalidStreamId {
                frame_type,
                stream_id,
            } => write!(f, "invalid stream id {stream_id} for {frame_type} frame"),
            ProtocolError::Fragment(v) => write!(f, "fragmentation violation: {v}"),
            ProtocolError::Envelope(v) => write!(f, "envelope violation: {v}"),
        }
    }
}

impl fmt::Display for FragmentViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentViolation::MissingStart => write!(f, "first frame lacks START"),
            FragmentViolation::UnexpectedStart => write!(f, "continuation frame carries START"),
            FragmentViolation::TypeChanged { expected, found } => {
                write!(f, "frame type changed from {expected} to {found} mid-message")
            }
            FragmentViolation::StreamChanged { expected, found } => {
                write!(f, "stream id changed from {expected} to {found} mid-message")
            }
            FragmentViolation::ControlFragmented => {
                write!(f, "keepalive frame is not a whole START|END frame")
            }
            FragmentViolation::ControlPayload { len } => {
                write!(f, "keepalive frame carries {len} payload bytes")
            }
        }
    }
}

impl fmt::Display for EnvelopeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeViolation::Truncated { len } => {
                write!(f, "first fragment of {len} bytes is shorter than the envelope")
            }
            EnvelopeViolation::ReservedBits { found } => {
                write!(f, "reserved envelope bytes are {found:#06x}, expected zero")
            }
            EnvelopeViolation::UnknownFormat { found } => {
                write!(f, "unknown payload format {found:#04x}")
            }
            EnvelopeViolation::UnknownKind { found } => {
                write!(f, "unknown payload kind {found:#04x}")
            }
        }
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => write!(f, "operation cancelled"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MaxPayloadTooSmall { max, min } => {
                write!(f, "max_frame_payload of {max} is below the minimum of {min}")
            }
        }
    }
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnError::Protocol(e) => write!(f, "protocol error: {e}"),
            ConnError::Io(e) => write!(f, "transport error: {e}"),
            ConnError::Cancelled(cause) => write!(f, "{cause}"),
            ConnError::Config(e) => write!(f, "configuration error: {e}"),
            ConnError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for FragmentViolation {}
impl std::error::Error for EnvelopeViolation {}
impl std::error::Error for ConfigError {}

impl std::error::Error for ConnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnError::Protocol(e) => Some(e),
            ConnError::Io(e) => Some(e),
            ConnError::Config(e) => Some(e),
            ConnError::Cancelled(_) | ConnError::Closed => None,
        }
    }
}

impl From<ProtocolError> for ConnError {
    fn from(e: ProtocolError) -> Self {
        ConnError::Protocol(e)
    }
}

impl From<FragmentViolation> for ConnError {
    fn from(v: FragmentViolation) -> Self {
        ConnError::Protocol(ProtocolError::Fragment(v))
    }
}

impl From<EnvelopeViolation> for ConnError {
    fn from(v: EnvelopeViolation) -> Self {
        ConnError::Protocol(ProtocolError::Envelope(v))
    }
}

impl From<std::io::Error> for ConnError {
    fn from(e: std::io::Error) -> Self {
        ConnError::Io(e)
    }
}

impl From<ConfigError> for ConnError {
    fn from(e: ConfigError) -> Self {
        ConnError::Config(e)
    }
}
