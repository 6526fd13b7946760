use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use switchboard_core::{CancelToken, Connection};
use switchboard_identity::AgentIdentity;
use tracing::{debug, warn};

use crate::{
    AuthBegin, AuthCode, AuthError, AuthPayload, AuthProof, HandshakeConfig, canonical_string,
    proto::{recv_auth, send_auth},
    unix_time_ms,
};

/// Outcome of a successful client-side handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    /// The identity this connection now speaks as.
    pub agent_id: String,
    /// Server-reported authentication time.
    pub authenticated_at_ms: u64,
}

/// Run the agent side of the handshake over `conn`.
///
/// Sends `auth_begin`, answers the server's challenge with a detached
/// signature over the canonical string, and waits for the verdict. On any
/// failure the connection is closed before the error is returned; a
/// rejected client cannot reuse the stream.
pub async fn authenticate_as_client(
    conn: &Connection,
    identity: &AgentIdentity,
    config: &HandshakeConfig,
) -> Result<ClientSession, AuthError> {
    match drive_client(conn, identity, config).await {
        Ok(session) => {
            debug!(agent_id = %session.agent_id, "authenticated to proxy");
            Ok(session)
        }
        Err(e) => {
            warn!(agent_id = %identity.agent_id(), error = %e, "client handshake failed");
            conn.close().await;
            Err(e)
        }
    }
}

async fn drive_client(
    conn: &Connection,
    identity: &AgentIdentity,
    config: &HandshakeConfig,
) -> Result<ClientSession, AuthError> {
    let agent_id = identity.agent_id().to_owned();

    let begin = AuthPayload::Begin(AuthBegin {
        v: crate::AUTH_PROTOCOL_VERSION,
        agent_id: agent_id.clone(),
        client_time_ms: Some(unix_time_ms()),
    });
    send_auth(conn, &CancelToken::with_timeout(config.write_timeout), &begin).await?;

    let challenge =
        match recv_auth(conn, &CancelToken::with_timeout(config.read_timeout)).await? {
            AuthPayload::Challenge(c) => c,
            AuthPayload::Error(e) => {
                return Err(AuthError::Refused {
                    code: e.code,
                    message: e.message,
                });
            }
            other => {
                return Err(AuthError::refused(
                    AuthCode::ProtocolError,
                    format!("expected auth_challenge, got {:?} stage", other.stage()),
                ));
            }
        };
    if challenge.challenge_id.is_empty() || challenge.nonce.is_empty() {
        return Err(AuthError::refused(
            AuthCode::ProtocolError,
            "challenge with empty challenge_id or nonce",
        ));
    }

    let to_sign = canonical_string(
        &agent_id,
        &challenge.challenge_id,
        &challenge.nonce,
        challenge.issued_at_ms,
    );
    let signature = URL_SAFE_NO_PAD.encode(identity.sign(to_sign.as_bytes()).to_bytes());

    let proof = AuthPayload::Proof(AuthProof {
        v: crate::AUTH_PROTOCOL_VERSION,
        agent_id: agent_id.clone(),
        challenge_id: challenge.challenge_id,
        nonce: challenge.nonce,
        issued_at_ms: challenge.issued_at_ms,
        signature,
    });
    send_auth(conn, &CancelToken::with_timeout(config.write_timeout), &proof).await?;

    match recv_auth(conn, &CancelToken::with_timeout(config.read_timeout)).await? {
        AuthPayload::Ok(ok) => {
            if ok.agent_id != agent_id {
                return Err(AuthError::refused(
                    AuthCode::ProtocolError,
                    "auth_ok names a different agent",
                ));
            }
            Ok(ClientSession {
                agent_id,
                authenticated_at_ms: ok.authenticated_at_ms,
            })
        }
        AuthPayload::Error(e) => Err(AuthError::Refused {
            code: e.code,
            message: e.message,
        }),
        other => Err(AuthError::refused(
            AuthCode::ProtocolError,
            format!("expected auth_ok, got {:?} stage", other.stage()),
        )),
    }
}
