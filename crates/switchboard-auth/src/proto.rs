use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use switchboard_core::{AuthStage, CancelToken, Connection, Message};

use crate::{AuthCode, AuthError};

/// Auth payload schema version; every message carries it as `v`.
pub const AUTH_PROTOCOL_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The five handshake payloads, tagged by their JSON `type` field.
///
/// Serde's default behavior ignores unrecognized fields, which gives the
/// forward-compatibility the wire contract requires; an unknown `type`
/// fails to parse and is classified as a protocol error by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthPayload {
    #[serde(rename = "auth_begin")]
    Begin(AuthBegin),
    #[serde(rename = "auth_challenge")]
    Challenge(AuthChallenge),
    #[serde(rename = "auth_proof")]
    Proof(AuthProof),
    #[serde(rename = "auth_ok")]
    Ok(AuthOk),
    #[serde(rename = "auth_error")]
    Error(AuthReject),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBegin {
    pub v: u32,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub v: u32,
    pub challenge_id: String,
    pub nonce: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProof {
    pub v: u32,
    pub agent_id: String,
    pub challenge_id: String,
    pub nonce: String,
    pub issued_at_ms: u64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOk {
    pub v: u32,
    pub agent_id: String,
    pub authenticated_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthReject {
    pub v: u32,
    pub code: AuthCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthPayload {
    /// Frame stage this payload travels as.
    pub fn stage(&self) -> AuthStage {
        match self {
            AuthPayload::Begin(_) => AuthStage::Begin,
            AuthPayload::Challenge(_) => AuthStage::Challenge,
            AuthPayload::Proof(_) => AuthStage::Proof,
            AuthPayload::Ok(_) => AuthStage::Ok,
            AuthPayload::Error(_) => AuthStage::Error,
        }
    }

    /// The schema version the payload claims.
    pub fn version(&self) -> u32 {
        match self {
            AuthPayload::Begin(p) => p.v,
            AuthPayload::Challenge(p) => p.v,
            AuthPayload::Proof(p) => p.v,
            AuthPayload::Ok(p) => p.v,
            AuthPayload::Error(p) => p.v,
        }
    }
}

/// Serialize and send one auth payload on its matching frame stage.
pub(crate) async fn send_auth(
    conn: &Connection,
    token: &CancelToken,
    payload: &AuthPayload,
) -> Result<(), AuthError> {
    let body = serde_json::to_vec(payload)?;
    conn.send(&Message::auth(payload.stage(), body), token)
        .await?;
    Ok(())
}

/// Receive the next frame and parse it as an auth payload.
///
/// Rejects non-auth frames, version drift, and a JSON `type` that
/// disagrees with the frame's stage; any of these ends the handshake as a
/// protocol error.
pub(crate) async fn recv_auth(
    conn: &Connection,
    token: &CancelToken,
) -> Result<AuthPayload, AuthError> {
    let message = conn.recv(token).await?;
    let (stage, body) = match message {
        Message::Auth { stage, body } => (stage, body),
        other => {
            return Err(AuthError::refused(
                AuthCode::ProtocolError,
                format!("unexpected {} frame during handshake", other.frame_type()),
            ));
        }
    };
    let payload: AuthPayload = serde_json::from_slice(&body)?;
    if payload.version() != AUTH_PROTOCOL_VERSION {
        return Err(AuthError::refused(
            AuthCode::ProtocolError,
            format!("unsupported auth version {}", payload.version()),
        ));
    }
    if payload.stage() != stage {
        return Err(AuthError::refused(
            AuthCode::ProtocolError,
            "auth payload type disagrees with frame type",
        ));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_serializes_with_type_tag() {
        let payload = AuthPayload::Begin(AuthBegin {
            v: 1,
            agent_id: "abc".into(),
            client_time_ms: None,
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"type":"auth_begin","v":1,"agent_id":"abc"}"#);
    }

    #[test]
    fn optional_fields_serialize_when_present() {
        let payload = AuthPayload::Begin(AuthBegin {
            v: 1,
            agent_id: "abc".into(),
            client_time_ms: Some(123),
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"client_time_ms\":123"));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"type":"auth_challenge","v":1,"challenge_id":"c","nonce":"n",
                       "issued_at_ms":1,"expires_at_ms":2,"future_field":"ignored"}"#;
        let payload: AuthPayload = serde_json::from_str(json).unwrap();
        match payload {
            AuthPayload::Challenge(c) => {
                assert_eq!(c.challenge_id, "c");
                assert_eq!(c.expires_at_ms, 2);
            }
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type":"auth_hello","v":1}"#;
        assert!(serde_json::from_str::<AuthPayload>(json).is_err());
    }

    #[test]
    fn error_payload_round_trips_code() {
        let payload = AuthPayload::Error(AuthReject {
            v: 1,
            code: AuthCode::BadSignature,
            message: Some("signature verification failed".into()),
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"code\":\"bad_signature\""));
        let back: AuthPayload = serde_json::from_str(&json).unwrap();
        match back {
            AuthPayload::Error(e) => assert_eq!(e.code, AuthCode::BadSignature),
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn stage_matches_variant() {
        let ok = AuthPayload::Ok(AuthOk {
            v: 1,
            agent_id: "a".into(),
            authenticated_at_ms: 5,
        });
        assert_eq!(ok.stage(), AuthStage::Ok);
        assert_eq!(ok.version(), 1);
    }
}
