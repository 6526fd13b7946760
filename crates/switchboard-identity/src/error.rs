use std::fmt;
use std::path::PathBuf;

/// Failures while resolving, loading, or persisting the agent keypair.
#[derive(Debug)]
pub enum IdentityError {
    /// Filesystem failure touching a key file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A key file exists but does not parse as the expected PEM document.
    Pem { path: PathBuf, detail: String },
    /// The stored public key does not match the one derived from the
    /// stored private key.
    KeyMismatch { private: PathBuf, public: PathBuf },
    /// Exactly one half of the keypair is present. Regenerating silently
    /// would change the agent's identity, so this is a hard error.
    MissingCounterpart { present: PathBuf, missing: PathBuf },
    /// No key path override is set and the platform reports no user
    /// config directory.
    NoConfigDir,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::Io { path, source } => {
                write!(f, "key store i/o on {}: {source}", path.display())
            }
            IdentityError::Pem { path, detail } => {
                write!(f, "malformed key file {}: {detail}", path.display())
            }
            IdentityError::KeyMismatch { private, public } => write!(
                f,
                "public key {} does not match private key {}",
                public.display(),
                private.display()
            ),
            IdentityError::MissingCounterpart { present, missing } => write!(
                f,
                "found {} but not {}; refusing to regenerate a partial keypair",
                present.display(),
                missing.display()
            ),
            IdentityError::NoConfigDir => {
                write!(f, "no user config directory available for key storage")
            }
        }
    }
}

impl std::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IdentityError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
