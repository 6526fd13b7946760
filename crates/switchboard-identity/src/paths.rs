use std::path::{Path, PathBuf};

use crate::IdentityError;

/// Environment variable overriding where the agent keypair lives.
///
/// A directory value keeps the default filenames inside it; a file value
/// names the private key, with the public path derived from it.
pub const KEY_PATH_ENV: &str = "SWITCHBOARD_KEY_PATH";

/// Default private key filename.
pub const PRIVATE_KEY_FILE: &str = "agent_ed25519_private.pem";

/// Default public key filename.
pub const PUBLIC_KEY_FILE: &str = "agent_ed25519_public.pem";

/// Resolved locations of the two key files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPaths {
    /// Resolve from the environment override, falling back to
    /// `<config_dir>/switchboard/keys/`.
    pub fn resolve() -> Result<KeyPaths, IdentityError> {
        match std::env::var_os(KEY_PATH_ENV) {
            Some(value) => Ok(Self::from_override(Path::new(&value))),
            None => Self::default_location(),
        }
    }

    /// Interpret an explicit override path.
    pub fn from_override(path: &Path) -> KeyPaths {
        if path.is_dir() {
            KeyPaths {
                private: path.join(PRIVATE_KEY_FILE),
                public: path.join(PUBLIC_KEY_FILE),
            }
        } else {
            KeyPaths {
                public: derive_public_path(path),
                private: path.to_path_buf(),
            }
        }
    }

    /// OS-appropriate per-user default.
    pub fn default_location() -> Result<KeyPaths, IdentityError> {
        let base = dirs::config_dir().ok_or(IdentityError::NoConfigDir)?;
        let keys = base.join("switchboard").join("keys");
        Ok(KeyPaths {
            private: keys.join(PRIVATE_KEY_FILE),
            public: keys.join(PUBLIC_KEY_FILE),
        })
    }
}

/// Derive a sibling public-key path from a private-key path: rewrite
/// `private` to `public` in the filename when present, else suffix the
/// stem with `.pub`.
fn derive_public_path(private: &Path) -> PathBuf {
    let name = private
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(PRIVATE_KEY_FILE);
    let public_name = if name.contains("private") {
        name.replace("private", "public")
    } else {
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}.pub.{ext}"),
            None => format!("{name}.pub"),
        }
    };
    private.with_file_name(public_name)
}
