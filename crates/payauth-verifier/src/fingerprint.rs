//! Signing certificate fingerprints and the matching rule.
//!
//! A candidate app is authorized by an entry when its installed version is
//! at least the entry's `min_version` and its signing fingerprints satisfy
//! the configured [`FingerprintPolicy`]. Comparison is exact: same length,
//! same bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{VerifyError, VerifyResult};
use crate::types::{AuthorizationEntry, InstalledIdentity};

/// Length of a SHA-256 certificate fingerprint.
pub const SHA256_FINGERPRINT_LEN: usize = 32;

/// Certificate fingerprint bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// SHA-256 over the DER bytes of a signing certificate.
    pub fn sha256_of_certificate(der: &[u8]) -> Self {
        Self(Sha256::digest(der).as_slice().to_vec())
    }

    /// Parse `"9A:89:C6:..."`. Hex digits are accepted in either case.
    pub fn from_colon_hex(s: &str) -> VerifyResult<Self> {
        let mut bytes = Vec::with_capacity(SHA256_FINGERPRINT_LEN);
        for part in s.split(':') {
            if part.len() != 2 {
                return Err(VerifyError::malformed(format!(
                    "invalid fingerprint byte {:?} in {:?}",
                    part, s
                )));
            }
            let byte = hex::decode(part).map_err(|e| {
                VerifyError::malformed(format!("invalid fingerprint hex {:?}: {}", part, e))
            })?;
            bytes.extend_from_slice(&byte);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_colon_hex(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = VerifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_colon_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

/// How installed fingerprints are compared against an entry's set when the
/// installed app carries more than one signing certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintPolicy {
    /// At least one installed fingerprint is declared by the entry.
    #[default]
    AnyMatch,

    /// Every installed fingerprint is declared by the entry.
    AllMatch,
}

impl FromStr for FingerprintPolicy {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "any_match" => Ok(Self::AnyMatch),
            "all" | "all_match" => Ok(Self::AllMatch),
            other => Err(VerifyError::Config {
                message: format!("unknown fingerprint policy: {}", other),
            }),
        }
    }
}

/// Whether `installed` is authorized by `entry`.
///
/// Does not look at package ids; the caller selects entries for the
/// candidate's package first.
pub fn matches(
    installed: &InstalledIdentity,
    entry: &AuthorizationEntry,
    policy: FingerprintPolicy,
) -> bool {
    if installed.version_code < entry.min_version {
        return false;
    }
    if installed.fingerprints.is_empty() {
        return false;
    }

    let declared = |fp: &Fingerprint| entry.fingerprints.iter().any(|d| d == fp);
    match policy {
        FingerprintPolicy::AnyMatch => installed.fingerprints.iter().any(declared),
        FingerprintPolicy::AllMatch => installed.fingerprints.iter().all(declared),
    }
}
