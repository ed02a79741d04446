use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fetch::{FetchOptions, DEFAULT_MAX_CONTENT_LEN};
use crate::verify::SignatureKind;

/// Top-level configuration from `.proofcheck.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default, rename = "proof")]
    pub proofs: Vec<ProofEntry>,
}

/// `[fetch]`: settings applied to every fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Bound on a whole fetch, in seconds. 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest proof body accepted.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_content_bytes() -> usize {
    DEFAULT_MAX_CONTENT_LEN
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

impl FetchSettings {
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_content_len: self.max_content_bytes,
        }
    }
}

/// `[[proof]]`: one proof to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEntry {
    pub url: String,
    /// Armored public key file. Relative paths resolve against the config
    /// file's directory.
    pub pubkey: PathBuf,
    #[serde(default)]
    pub kind: SignatureKind,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Literal request for `tcp://` proofs.
    #[serde(default)]
    pub request: Option<String>,
}

fn default_max_age_secs() -> u64 {
    3600
}

impl ProofEntry {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for entry in &mut self.proofs {
            if entry.pubkey.is_relative() {
                entry.pubkey = base.join(&entry.pubkey);
            }
        }
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# proofcheck configuration

[fetch]
# Bound on each fetch, in seconds (0 disables).
timeout_secs = 5

# Largest proof body accepted, in bytes.
max_content_bytes = 1048576

# One table per proof to check.
# [[proof]]
# url = "gemini://example.org/proof.txt"
# pubkey = "keys/example.asc"
# kind = "pgp"
# max_age_secs = 3600
#
# [[proof]]
# url = "tcp://example.org:79"
# pubkey = "keys/example.asc"
# request = "alice\r\n"
"#
    }
}
