//! Static host package inventory.
//!
//! Stands in for the host package manager: a fixed map from package id to
//! installed identity, built in code or loaded from a JSON file such as
//!
//! ```json
//! [
//!   { "package_id": "com.bobpay.app", "version_code": 10,
//!     "certificates": ["01020304050607080900"] }
//! ]
//! ```
//!
//! Certificates are hex-encoded DER; their SHA-256 digests become the
//! installed fingerprints.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::collaborators::PackageInspector;
use crate::error::{VerifyError, VerifyResult};
use crate::fingerprint::Fingerprint;
use crate::types::InstalledIdentity;

/// An installed package as described to the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package_id: String,

    pub version_code: i64,

    /// Hex-encoded signing certificates.
    pub certificates: Vec<String>,
}

impl InstalledPackage {
    /// Installed identity with SHA-256 certificate fingerprints.
    pub fn identity(&self) -> VerifyResult<InstalledIdentity> {
        let fingerprints = self
            .certificates
            .iter()
            .map(|cert| {
                hex::decode(cert.trim())
                    .map(|der| Fingerprint::sha256_of_certificate(&der))
                    .map_err(|e| VerifyError::Config {
                        message: format!(
                            "invalid certificate hex for {}: {}",
                            self.package_id, e
                        ),
                    })
            })
            .collect::<VerifyResult<Vec<_>>>()?;

        Ok(InstalledIdentity {
            version_code: self.version_code,
            fingerprints,
        })
    }
}

/// In-memory [`PackageInspector`].
#[derive(Debug, Clone, Default)]
pub struct StaticPackageInspector {
    packages: HashMap<String, InstalledIdentity>,
}

impl StaticPackageInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity directly.
    pub fn with_identity(
        mut self,
        package_id: impl Into<String>,
        identity: InstalledIdentity,
    ) -> Self {
        self.packages.insert(package_id.into(), identity);
        self
    }

    /// Register a package, deriving fingerprints from its certificates.
    pub fn with_package(mut self, package: &InstalledPackage) -> VerifyResult<Self> {
        let identity = package.identity()?;
        self.packages.insert(package.package_id.clone(), identity);
        Ok(self)
    }

    pub fn from_packages(packages: &[InstalledPackage]) -> VerifyResult<Self> {
        packages
            .iter()
            .try_fold(Self::new(), |inventory, package| inventory.with_package(package))
    }

    /// Load a JSON array of [`InstalledPackage`].
    pub async fn from_json_file(path: impl AsRef<Path>) -> VerifyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| VerifyError::Config {
                message: format!("failed to read inventory {}: {}", path.display(), e),
            })?;

        let packages: Vec<InstalledPackage> =
            serde_json::from_str(&content).map_err(|e| VerifyError::Config {
                message: format!("failed to parse inventory {}: {}", path.display(), e),
            })?;

        debug!(path = %path.display(), packages = packages.len(), "loaded package inventory");
        Self::from_packages(&packages)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageInspector for StaticPackageInspector {
    fn installed_identity(&self, package_id: &str) -> Option<InstalledIdentity> {
        self.packages.get(package_id).cloned()
    }
}
