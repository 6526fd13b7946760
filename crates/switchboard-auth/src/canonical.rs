/// Domain-separation prefix for the v1 string-to-sign.
pub const CANONICAL_PREFIX: &str = "switchboard-auth-v1";

/// Build the deterministic string both sides sign and verify.
///
/// Lines are LF-terminated, including the last one; any drift here breaks
/// signature verification between otherwise-correct peers.
pub fn canonical_string(
    agent_id: &str,
    challenge_id: &str,
    nonce: &str,
    issued_at_ms: u64,
) -> String {
    format!(
        "{CANONICAL_PREFIX}\n\
         agent_id={agent_id}\n\
         challenge_id={challenge_id}\n\
         nonce={nonce}\n\
         issued_at_ms={issued_at_ms}\n"
    )
}
