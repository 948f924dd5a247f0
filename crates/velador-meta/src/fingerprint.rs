//! Configuration fingerprints.
//!
//! A fingerprint is a stable digest of the subset of configuration that
//! defines a daemon's identity. Two equal fingerprints mean a running
//! instance is still valid for the current configuration; anything else
//! forces a replacement. The supervisor never interprets the value beyond
//! equality.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MetadataError, Result};

/// Hex-encoded SHA-256 digest of identity-relevant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest length in hex characters.
    const HEX_LEN: usize = 64;

    /// Computes a fingerprint over raw bytes.
    #[must_use]
    pub fn digest(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(Self::HEX_LEN);
        for byte in digest {
            use std::fmt::Write as _;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Parses a previously persisted fingerprint.
    ///
    /// # Errors
    /// Returns a parse error if the value is not a 64-character hex string.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != Self::HEX_LEN || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MetadataError::parse(
                "fingerprint",
                format!("expected {} hex characters, got {:?}", Self::HEX_LEN, value),
            ));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
