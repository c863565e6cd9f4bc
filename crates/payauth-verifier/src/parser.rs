//! JSON manifest parser.
//!
//! Payment method manifest:
//!
//! ```json
//! { "default_applications": ["https://bobpay.com/app.json"],
//!   "supported_origins": ["https://alicepay.com"] }
//! ```
//!
//! Web app manifest:
//!
//! ```json
//! { "related_applications": [
//!     { "platform": "play", "id": "com.bobpay.app", "min_version": "10",
//!       "fingerprints": [{ "type": "sha256_cert", "value": "9A:89:..." }] } ] }
//! ```
//!
//! A single malformed entry rejects the whole manifest.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::collaborators::ManifestParser;
use crate::download::is_allowed_manifest_url;
use crate::error::{VerifyError, VerifyResult};
use crate::fingerprint::{Fingerprint, SHA256_FINGERPRINT_LEN};
use crate::types::AuthorizationEntry;

/// Most web app manifests a payment method manifest may list.
pub const MAX_DEFAULT_APPLICATIONS: usize = 100;

/// Most related applications a web app manifest may list.
pub const MAX_RELATED_APPLICATIONS: usize = 100;

const PLATFORM_PLAY: &str = "play";
const FINGERPRINT_TYPE_SHA256: &str = "sha256_cert";

/// Parser for the JSON manifest formats.
#[derive(Debug, Clone)]
pub struct JsonManifestParser {
    allow_loopback_http: bool,
}

impl Default for JsonManifestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonManifestParser {
    pub fn new() -> Self {
        Self {
            allow_loopback_http: true,
        }
    }

    /// Accept `http` web app manifest URLs on loopback hosts.
    pub fn with_loopback_http(mut self, allow: bool) -> Self {
        self.allow_loopback_http = allow;
        self
    }

    /// Parse a payment method manifest into web app manifest URLs.
    pub fn parse_method(&self, content: &[u8]) -> VerifyResult<Vec<Url>> {
        let root = parse_object(content)?;

        let apps = match root.get("default_applications") {
            None => return Ok(Vec::new()),
            Some(Value::Array(apps)) => apps,
            Some(_) => {
                return Err(VerifyError::malformed(
                    "\"default_applications\" must be a list",
                ))
            }
        };

        if apps.len() > MAX_DEFAULT_APPLICATIONS {
            return Err(VerifyError::malformed(format!(
                "\"default_applications\" has {} entries, limit is {}",
                apps.len(),
                MAX_DEFAULT_APPLICATIONS
            )));
        }

        apps.iter()
            .map(|app| {
                let raw = app.as_str().ok_or_else(|| {
                    VerifyError::malformed("\"default_applications\" entries must be strings")
                })?;
                let url = Url::parse(raw).map_err(|e| {
                    VerifyError::malformed(format!("invalid web app manifest URL {:?}: {}", raw, e))
                })?;
                if !is_allowed_manifest_url(&url, self.allow_loopback_http) {
                    return Err(VerifyError::malformed(format!(
                        "web app manifest URL must be https: {}",
                        url
                    )));
                }
                Ok(url)
            })
            .collect()
    }

    /// Parse a web app manifest into authorization entries.
    pub fn parse_app(&self, content: &[u8]) -> VerifyResult<Vec<AuthorizationEntry>> {
        let root = parse_object(content)?;

        let apps = match root.get("related_applications") {
            Some(Value::Array(apps)) => apps,
            Some(_) => {
                return Err(VerifyError::malformed(
                    "\"related_applications\" must be a list",
                ))
            }
            None => {
                return Err(VerifyError::malformed(
                    "web app manifest has no \"related_applications\"",
                ))
            }
        };

        if apps.len() > MAX_RELATED_APPLICATIONS {
            return Err(VerifyError::malformed(format!(
                "\"related_applications\" has {} entries, limit is {}",
                apps.len(),
                MAX_RELATED_APPLICATIONS
            )));
        }

        let mut entries = Vec::new();
        for app in apps {
            let app = app.as_object().ok_or_else(|| {
                VerifyError::malformed("\"related_applications\" entries must be objects")
            })?;

            if app.get("platform").and_then(Value::as_str) != Some(PLATFORM_PLAY) {
                debug!(platform = ?app.get("platform"), "skipping non-play related application");
                continue;
            }

            entries.push(parse_play_app(app)?);
        }

        Ok(entries)
    }
}

#[async_trait]
impl ManifestParser for JsonManifestParser {
    async fn parse_method_manifest(&self, content: &[u8]) -> VerifyResult<Vec<Url>> {
        self.parse_method(content)
    }

    async fn parse_app_manifest(&self, content: &[u8]) -> VerifyResult<Vec<AuthorizationEntry>> {
        self.parse_app(content)
    }
}

fn parse_object(content: &[u8]) -> VerifyResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VerifyError::malformed("manifest must be a JSON object")),
        Err(e) => Err(VerifyError::malformed(format!("invalid JSON: {}", e))),
    }
}

fn parse_play_app(app: &Map<String, Value>) -> VerifyResult<AuthorizationEntry> {
    let package_id = app
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| VerifyError::malformed("play application needs a non-empty \"id\""))?;

    let min_version = match app.get("min_version") {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
    .filter(|v| *v >= 0)
    .ok_or_else(|| {
        VerifyError::malformed(format!(
            "{}: \"min_version\" must be a non-negative integer",
            package_id
        ))
    })?;

    let fingerprints = app
        .get("fingerprints")
        .and_then(Value::as_array)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| {
            VerifyError::malformed(format!(
                "{}: \"fingerprints\" must be a non-empty list",
                package_id
            ))
        })?
        .iter()
        .map(|fp| parse_fingerprint(package_id, fp))
        .collect::<VerifyResult<Vec<_>>>()?;

    Ok(AuthorizationEntry {
        package_id: package_id.to_string(),
        min_version,
        fingerprints,
    })
}

fn parse_fingerprint(package_id: &str, value: &Value) -> VerifyResult<Fingerprint> {
    let kind = value.get("type").and_then(Value::as_str);
    if kind != Some(FINGERPRINT_TYPE_SHA256) {
        return Err(VerifyError::malformed(format!(
            "{}: unsupported fingerprint type {:?}",
            package_id, kind
        )));
    }

    let raw = value
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            VerifyError::malformed(format!("{}: fingerprint has no value", package_id))
        })?;

    let fingerprint = Fingerprint::from_colon_hex(raw)?;
    if fingerprint.len() != SHA256_FINGERPRINT_LEN {
        return Err(VerifyError::malformed(format!(
            "{}: fingerprint is {} bytes, expected {}",
            package_id,
            fingerprint.len(),
            SHA256_FINGERPRINT_LEN
        )));
    }

    Ok(fingerprint)
}
