use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;
use switchboard_identity::agent_id_from_key;

/// Lookup from agent id to registered public key.
///
/// The proxy injects an implementation into the server handshake; backends
/// range from an in-memory map to a database. Returning `None` means the
/// agent is unknown.
pub trait AgentRegistry: Send + Sync {
    fn lookup(&self, agent_id: &str) -> Option<VerifyingKey>;
}

impl<F> AgentRegistry for F
where
    F: Fn(&str) -> Option<VerifyingKey> + Send + Sync,
{
    fn lookup(&self, agent_id: &str) -> Option<VerifyingKey> {
        self(agent_id)
    }
}

/// Hash-map registry for servers with a static key set and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    keys: HashMap<String, VerifyingKey>,
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry::default()
    }

    /// Register a key under its derived agent id; returns the id.
    pub fn register(&mut self, key: VerifyingKey) -> String {
        let agent_id = agent_id_from_key(&key);
        self.keys.insert(agent_id.clone(), key);
        agent_id
    }

    /// Register a key under an arbitrary id, bypassing derivation. The
    /// server's self-consistency check will reject such entries; exists
    /// for tests of exactly that path.
    pub fn register_as(&mut self, agent_id: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(agent_id.into(), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl AgentRegistry for MemoryRegistry {
    fn lookup(&self, agent_id: &str) -> Option<VerifyingKey> {
        self.keys.get(agent_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn register_derives_the_lookup_key() {
        let key = SigningKey::generate(&mut OsRng).verifying_key();
        let mut registry = MemoryRegistry::new();
        let agent_id = registry.register(key);

        assert_eq!(agent_id, agent_id_from_key(&key));
        assert_eq!(registry.lookup(&agent_id), Some(key));
        assert_eq!(registry.lookup("missing"), None);
    }

    #[test]
    fn closures_are_registries() {
        let key = SigningKey::generate(&mut OsRng).verifying_key();
        let agent_id = agent_id_from_key(&key);
        let lookup = move |id: &str| (id == agent_id).then_some(key);
        assert!(lookup.lookup("nope").is_none());
    }
}
