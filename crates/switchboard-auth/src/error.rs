use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_core::ConnError;

/// Stable handshake rejection codes; these tokens cross the wire in
/// `auth_error` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCode {
    ProtocolError,
    UnknownAgent,
    ReplayedChallenge,
    ExpiredChallenge,
    BadSignature,
    InternalError,
}

impl AuthCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthCode::ProtocolError => "protocol_error",
            AuthCode::UnknownAgent => "unknown_agent",
            AuthCode::ReplayedChallenge => "replayed_challenge",
            AuthCode::ExpiredChallenge => "expired_challenge",
            AuthCode::BadSignature => "bad_signature",
            AuthCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for AuthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a handshake failed.
#[derive(Debug)]
pub enum AuthError {
    /// The handshake was refused with a protocol-level code; either this
    /// side rejected the peer, or the peer sent `auth_error`.
    Refused {
        code: AuthCode,
        message: Option<String>,
    },
    /// The underlying connection failed (framing, I/O, cancellation).
    Conn(ConnError),
    /// An auth payload could not be serialized or parsed.
    Json(serde_json::Error),
}

impl AuthError {
    pub(crate) fn refused(code: AuthCode, message: impl Into<String>) -> AuthError {
        AuthError::Refused {
            code,
            message: Some(message.into()),
        }
    }

    /// The rejection code, when the failure carries one.
    pub fn code(&self) -> Option<AuthCode> {
        match self {
            AuthError::Refused { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Refused {
                code,
                message: Some(message),
            } => write!(f, "authentication refused ({code}): {message}"),
            AuthError::Refused {
                code,
                message: None,
            } => write!(f, "authentication refused ({code})"),
            AuthError::Conn(e) => write!(f, "handshake transport failure: {e}"),
            AuthError::Json(e) => write!(f, "malformed auth payload: {e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Conn(e) => Some(e),
            AuthError::Json(e) => Some(e),
            AuthError::Refused { .. } => None,
        }
    }
}

impl From<ConnError> for AuthError {
    fn from(e: ConnError) -> Self {
        AuthError::Conn(e)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_stable_tokens() {
        for (code, token) in [
            (AuthCode::ProtocolError, "\"protocol_error\""),
            (AuthCode::UnknownAgent, "\"unknown_agent\""),
            (AuthCode::ReplayedChallenge, "\"replayed_challenge\""),
            (AuthCode::ExpiredChallenge, "\"expired_challenge\""),
            (AuthCode::BadSignature, "\"bad_signature\""),
            (AuthCode::InternalError, "\"internal_error\""),
        ] {
            assert_eq!(serde_json::to_string(&code).unwrap(), token);
            let parsed: AuthCode = serde_json::from_str(token).unwrap();
            assert_eq!(parsed, code);
        }
    }
}
