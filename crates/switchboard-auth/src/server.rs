use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use switchboard_core::{CancelToken, Connection};
use switchboard_identity::agent_id_from_key;
use tracing::{debug, warn};

use crate::{
    AgentRegistry, AuthChallenge, AuthCode, AuthError, AuthOk, AuthPayload, AuthProof, AuthReject,
    HandshakeConfig, canonical_string,
    proto::{recv_auth, send_auth},
    unix_time_ms,
};

/// Byte length of the random challenge nonce.
const NONCE_LEN: usize = 32;

/// Byte length of the random challenge id.
const CHALLENGE_ID_LEN: usize = 24;

/// Outcome of a successful server-side handshake, handed to the routing
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAgent {
    pub agent_id: String,
    pub authenticated_at_ms: u64,
}

/// Run the proxy side of the handshake over `conn`.
///
/// Consumes `auth_begin`, issues a fresh challenge, and accepts the proof
/// only when every bound field echoes exactly, the challenge is still
/// fresh, and the Ed25519 signature verifies under the registered key. On
/// rejection an `auth_error` is sent best-effort, the connection is
/// closed, and the failure (with its code) is returned to the caller.
pub async fn wait_for_agent_authentication<R>(
    conn: &Connection,
    registry: &R,
    config: &HandshakeConfig,
) -> Result<AuthenticatedAgent, AuthError>
where
    R: AgentRegistry + ?Sized,
{
    match drive_server(conn, registry, config).await {
        Ok(agent) => {
            debug!(agent_id = %agent.agent_id, "agent authenticated");
            Ok(agent)
        }
        Err(e) => {
            // A body that does not parse is a protocol-level rejection,
            // not a transport failure; classify it so the peer gets a code.
            let e = match e {
                AuthError::Json(e) => {
                    AuthError::refused(AuthCode::ProtocolError, format!("malformed payload: {e}"))
                }
                other => other,
            };
            warn!(error = %e, "server handshake failed");
            if let AuthError::Refused { code, message } = &e {
                let reject = AuthPayload::Error(AuthReject {
                    v: crate::AUTH_PROTOCOL_VERSION,
                    code: *code,
                    message: message.clone(),
                });
                let token = CancelToken::with_timeout(config.write_timeout);
                // Best effort: the peer may already be gone.
                let _ = send_auth(conn, &token, &reject).await;
            }
            conn.close().await;
            Err(e)
        }
    }
}

async fn drive_server<R>(
    conn: &Connection,
    registry: &R,
    config: &HandshakeConfig,
) -> Result<AuthenticatedAgent, AuthError>
where
    R: AgentRegistry + ?Sized,
{
    let begin = match recv_auth(conn, &CancelToken::with_timeout(config.read_timeout)).await? {
        AuthPayload::Begin(b) => b,
        other => {
            return Err(AuthError::refused(
                AuthCode::ProtocolError,
                format!("expected auth_begin, got {:?} stage", other.stage()),
            ));
        }
    };
    if begin.agent_id.is_empty() {
        return Err(AuthError::refused(
            AuthCode::ProtocolError,
            "auth_begin with empty agent_id",
        ));
    }

    let Some(public_key) = registry.lookup(&begin.agent_id) else {
        return Err(AuthError::Refused {
            code: AuthCode::UnknownAgent,
            message: None,
        });
    };
    // Registry self-consistency: the stored key must hash back to the id
    // it was looked up under.
    if agent_id_from_key(&public_key) != begin.agent_id {
        return Err(AuthError::Refused {
            code: AuthCode::UnknownAgent,
            message: None,
        });
    }

    let challenge = mint_challenge(config);
    send_auth(
        conn,
        &CancelToken::with_timeout(config.write_timeout),
        &AuthPayload::Challenge(challenge.clone()),
    )
    .await?;

    let proof = match recv_auth(conn, &CancelToken::with_timeout(config.read_timeout)).await? {
        AuthPayload::Proof(p) => p,
        other => {
            return Err(AuthError::refused(
                AuthCode::ProtocolError,
                format!("expected auth_proof, got {:?} stage", other.stage()),
            ));
        }
    };

    verify_proof(&begin.agent_id, &public_key, &challenge, &proof)?;

    let ok = AuthOk {
        v: crate::AUTH_PROTOCOL_VERSION,
        agent_id: begin.agent_id.clone(),
        authenticated_at_ms: unix_time_ms(),
    };
    send_auth(
        conn,
        &CancelToken::with_timeout(config.write_timeout),
        &AuthPayload::Ok(ok.clone()),
    )
    .await?;

    Ok(AuthenticatedAgent {
        agent_id: ok.agent_id,
        authenticated_at_ms: ok.authenticated_at_ms,
    })
}

fn mint_challenge(config: &HandshakeConfig) -> AuthChallenge {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let mut challenge_id = [0u8; CHALLENGE_ID_LEN];
    OsRng.fill_bytes(&mut challenge_id);

    let issued_at_ms = unix_time_ms();
    AuthChallenge {
        v: crate::AUTH_PROTOCOL_VERSION,
        challenge_id: URL_SAFE_NO_PAD.encode(challenge_id),
        nonce: URL_SAFE_NO_PAD.encode(nonce),
        issued_at_ms,
        expires_at_ms: issued_at_ms + config.challenge_ttl.as_millis() as u64,
    }
}

/// Check the proof against the outstanding challenge: exact echo of every
/// bound field, freshness, then the signature itself.
fn verify_proof(
    agent_id: &str,
    public_key: &VerifyingKey,
    challenge: &AuthChallenge,
    proof: &AuthProof,
) -> Result<(), AuthError> {
    let echoed = proof.agent_id == agent_id
        && proof.challenge_id == challenge.challenge_id
        && proof.nonce == challenge.nonce
        && proof.issued_at_ms == challenge.issued_at_ms;
    if !echoed {
        return Err(AuthError::Refused {
            code: AuthCode::ReplayedChallenge,
            message: Some("proof does not echo the outstanding challenge".into()),
        });
    }

    if unix_time_ms() > challenge.expires_at_ms {
        return Err(AuthError::Refused {
            code: AuthCode::ExpiredChallenge,
            message: None,
        });
    }

    let signature_bytes = URL_SAFE_NO_PAD.decode(&proof.signature).map_err(|_| {
        AuthError::refused(AuthCode::BadSignature, "signature is not valid base64url")
    })?;
    let signature = Signature::from_slice(&signature_bytes).map_err(|_| {
        AuthError::refused(AuthCode::BadSignature, "signature is not 64 bytes")
    })?;

    let to_sign = canonical_string(
        agent_id,
        &challenge.challenge_id,
        &challenge.nonce,
        challenge.issued_at_ms,
    );
    public_key
        .verify(to_sign.as_bytes(), &signature)
        .map_err(|_| AuthError::Refused {
            code: AuthCode::BadSignature,
            message: None,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical_string;
    use ed25519_dalek::{Signer, SigningKey};
    use std::time::Duration;

    fn test_challenge(ttl: Duration) -> AuthChallenge {
        let issued_at_ms = unix_time_ms();
        AuthChallenge {
            v: 1,
            challenge_id: "challenge-1".into(),
            nonce: "nonce-1".into(),
            issued_at_ms,
            expires_at_ms: issued_at_ms + ttl.as_millis() as u64,
        }
    }

    fn signed_proof(signing: &SigningKey, agent_id: &str, challenge: &AuthChallenge) -> AuthProof {
        let to_sign = canonical_string(
            agent_id,
            &challenge.challenge_id,
            &challenge.nonce,
            challenge.issued_at_ms,
        );
        AuthProof {
            v: 1,
            agent_id: agent_id.into(),
            challenge_id: challenge.challenge_id.clone(),
            nonce: challenge.nonce.clone(),
            issued_at_ms: challenge.issued_at_ms,
            signature: URL_SAFE_NO_PAD.encode(signing.sign(to_sign.as_bytes()).to_bytes()),
        }
    }

    #[test]
    fn valid_proof_is_accepted() {
        let signing = SigningKey::generate(&mut OsRng);
        let agent_id = agent_id_from_key(&signing.verifying_key());
        let challenge = test_challenge(Duration::from_secs(30));
        let proof = signed_proof(&signing, &agent_id, &challenge);

        assert!(verify_proof(&agent_id, &signing.verifying_key(), &challenge, &proof).is_ok());
    }

    #[test]
    fn tampered_nonce_reports_replay() {
        let signing = SigningKey::generate(&mut OsRng);
        let agent_id = agent_id_from_key(&signing.verifying_key());
        let challenge = test_challenge(Duration::from_secs(30));
        let mut proof = signed_proof(&signing, &agent_id, &challenge);
        proof.nonce = "different-nonce".into();

        let err =
            verify_proof(&agent_id, &signing.verifying_key(), &challenge, &proof).unwrap_err();
        assert_eq!(err.code(), Some(AuthCode::ReplayedChallenge));
    }

    #[test]
    fn stale_challenge_reports_expiry() {
        let signing = SigningKey::generate(&mut OsRng);
        let agent_id = agent_id_from_key(&signing.verifying_key());
        let mut challenge = test_challenge(Duration::from_secs(30));
        challenge.expires_at_ms = challenge.issued_at_ms.saturating_sub(1);
        let proof = signed_proof(&signing, &agent_id, &challenge);

        let err =
            verify_proof(&agent_id, &signing.verifying_key(), &challenge, &proof).unwrap_err();
        assert_eq!(err.code(), Some(AuthCode::ExpiredChallenge));
    }

    #[test]
    fn wrong_key_reports_bad_signature() {
        let signing = SigningKey::generate(&mut OsRng);
        let imposter = SigningKey::generate(&mut OsRng);
        let agent_id = agent_id_from_key(&signing.verifying_key());
        let challenge = test_challenge(Duration::from_secs(30));
        let proof = signed_proof(&imposter, &agent_id, &challenge);

        let err =
            verify_proof(&agent_id, &signing.verifying_key(), &challenge, &proof).unwrap_err();
        assert_eq!(err.code(), Some(AuthCode::BadSignature));
    }

    #[test]
    fn short_signature_reports_bad_signature() {
        let signing = SigningKey::generate(&mut OsRng);
        let agent_id = agent_id_from_key(&signing.verifying_key());
        let challenge = test_challenge(Duration::from_secs(30));
        let mut proof = signed_proof(&signing, &agent_id, &challenge);
        proof.signature = URL_SAFE_NO_PAD.encode([0u8; 16]);

        let err =
            verify_proof(&agent_id, &signing.verifying_key(), &challenge, &proof).unwrap_err();
        assert_eq!(err.code(), Some(AuthCode::BadSignature));
    }

    #[test]
    fn minted_challenges_are_distinct_and_unpadded() {
        let config = HandshakeConfig::default();
        let a = mint_challenge(&config);
        let b = mint_challenge(&config);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.challenge_id, b.challenge_id);
        assert!(!a.nonce.contains('='));
        assert!(!a.challenge_id.contains('='));
        // base64url of 32 and 24 bytes without padding.
        assert_eq!(a.nonce.len(), 43);
        assert_eq!(a.challenge_id.len(), 32);
        assert_eq!(a.expires_at_ms - a.issued_at_ms, 30_000);
    }
}
