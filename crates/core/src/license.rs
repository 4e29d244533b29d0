//! License blob parsing, signature verification, and feature gating.
//!
//! Wire format: `ENC-LICENSE-V1:<base64-payload>:<base64-signature>` with
//! exactly one `:` between the three parts. The payload is a JSON document
//! `{product, licensee, issued_at, not_before, expires_at, features[]}`;
//! the signature is HMAC-SHA256 over the raw payload bytes using the
//! server-held `LICENSE_SECRET`.
//!
//! Signature validity is checked once at load; the time window is checked
//! at request time with zero grace. Feature tags are case-insensitive.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CoreError;
use crate::types::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Header tag of the supported license wire format.
pub const LICENSE_HEADER: &str = "ENC-LICENSE-V1";

/// Feature tags the core gates on.
pub mod features {
    pub const CLUSTERS: &str = "clusters";
    pub const INSPECTIONS: &str = "inspections";
    pub const REPORTS: &str = "reports";
}

/// Decoded license payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePayload {
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub licensee: Option<String>,
    #[serde(default)]
    pub issued_at: Option<Timestamp>,
    #[serde(default)]
    pub not_before: Option<Timestamp>,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub features: Vec<String>,
}

impl LicensePayload {
    /// Canonical lowercase feature set.
    fn feature_set(&self) -> BTreeSet<String> {
        self.features
            .iter()
            .map(|f| f.trim().to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

/// Why a license blob failed to parse or verify.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LicenseError {
    #[error("license format invalid")]
    Malformed,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("license payload invalid: {0}")]
    PayloadInvalid(String),
    #[error("license verification key not configured")]
    SecretMissing,
}

/// Parse and verify a license blob against the server secret.
///
/// Only the format and signature are checked here; the time window is
/// evaluated by [`LicenseManager::status`] at request time.
pub fn parse_and_verify(blob: &str, secret: &str) -> Result<LicensePayload, LicenseError> {
    let trimmed = blob.trim();
    let mut parts = trimmed.splitn(3, ':');
    let header = parts.next().ok_or(LicenseError::Malformed)?;
    let payload_b64 = parts.next().ok_or(LicenseError::Malformed)?;
    let signature_b64 = parts.next().ok_or(LicenseError::Malformed)?;

    if header != LICENSE_HEADER {
        return Err(LicenseError::Malformed);
    }

    let payload_bytes = BASE64
        .decode(payload_b64)
        .map_err(|_| LicenseError::Malformed)?;
    let signature = BASE64
        .decode(signature_b64)
        .map_err(|_| LicenseError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| LicenseError::SecretMissing)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&signature)
        .map_err(|_| LicenseError::SignatureInvalid)?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| LicenseError::PayloadInvalid(e.to_string()))
}

/// Encode a payload into the wire format. Used by operator tooling and tests.
pub fn encode(payload: &LicensePayload, secret: &str) -> String {
    let payload_bytes = serde_json::to_vec(payload).expect("license payload is serialisable");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&payload_bytes);
    let signature = mac.finalize().into_bytes();
    format!(
        "{LICENSE_HEADER}:{}:{}",
        BASE64.encode(&payload_bytes),
        BASE64.encode(signature)
    )
}

/// Current validity and metadata of the installed license.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseStatus {
    pub valid: bool,
    pub reason: Option<String>,
    pub product: Option<String>,
    pub licensee: Option<String>,
    pub issued_at: Option<Timestamp>,
    pub not_before: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub features: Vec<String>,
}

impl LicenseStatus {
    fn invalid(reason: impl Into<String>) -> Self {
        LicenseStatus {
            valid: false,
            reason: Some(reason.into()),
            product: None,
            licensee: None,
            issued_at: None,
            not_before: None,
            expires_at: None,
            features: Vec::new(),
        }
    }
}

/// Holds the installed license and answers gating queries.
///
/// `reload` reads the blob from disk; `install` persists a new blob and
/// replaces the in-memory state. Both keep the last parse failure as the
/// status reason.
pub struct LicenseManager {
    path: PathBuf,
    secret: Option<String>,
    state: RwLock<LoadState>,
}

enum LoadState {
    Missing,
    Invalid(String),
    Loaded(LicensePayload),
}

impl LicenseManager {
    pub fn new(path: impl Into<PathBuf>, secret: Option<String>) -> Self {
        let manager = LicenseManager {
            path: path.into(),
            secret,
            state: RwLock::new(LoadState::Missing),
        };
        manager.reload();
        manager
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the license blob from disk.
    pub fn reload(&self) {
        let next = match std::fs::read_to_string(&self.path) {
            Ok(text) => self.parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LoadState::Missing,
            Err(e) => LoadState::Invalid(format!("license file unreadable: {e}")),
        };
        *self.state.write().expect("license lock poisoned") = next;
    }

    /// Verify and persist a new license blob, replacing the current one.
    pub fn install(&self, blob: &str) -> Result<LicenseStatus, CoreError> {
        let payload = match self.parse(blob) {
            LoadState::Loaded(payload) => payload,
            LoadState::Invalid(reason) => return Err(CoreError::LicenseDenied(reason)),
            LoadState::Missing => {
                return Err(CoreError::LicenseDenied("license blob is empty".into()))
            }
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Internal(format!("cannot create license dir: {e}")))?;
        }
        std::fs::write(&self.path, blob.trim())
            .map_err(|e| CoreError::Internal(format!("cannot persist license: {e}")))?;

        *self.state.write().expect("license lock poisoned") = LoadState::Loaded(payload);
        Ok(self.status())
    }

    fn parse(&self, text: &str) -> LoadState {
        if text.trim().is_empty() {
            return LoadState::Missing;
        }
        let Some(secret) = self.secret.as_deref() else {
            return LoadState::Invalid(LicenseError::SecretMissing.to_string());
        };
        match parse_and_verify(text, secret) {
            Ok(payload) => LoadState::Loaded(payload),
            Err(e) => LoadState::Invalid(e.to_string()),
        }
    }

    /// Current status, with the time window evaluated against the wall clock.
    pub fn status(&self) -> LicenseStatus {
        let state = self.state.read().expect("license lock poisoned");
        let payload = match &*state {
            LoadState::Missing => return LicenseStatus::invalid("no license installed"),
            LoadState::Invalid(reason) => return LicenseStatus::invalid(reason.clone()),
            LoadState::Loaded(payload) => payload,
        };

        let now = Utc::now();
        let features: Vec<String> = payload.feature_set().into_iter().collect();
        let mut status = LicenseStatus {
            valid: true,
            reason: None,
            product: payload.product.clone(),
            licensee: payload.licensee.clone(),
            issued_at: payload.issued_at,
            not_before: payload.not_before,
            expires_at: Some(payload.expires_at),
            features,
        };

        if let Some(not_before) = payload.not_before {
            if now < not_before {
                status.valid = false;
                status.reason = Some("not yet valid".into());
                return status;
            }
        }
        if now > payload.expires_at {
            status.valid = false;
            status.reason = Some(format!(
                "expired at {}",
                payload.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        status
    }

    /// Gate an operation on the given feature tags.
    pub fn require(&self, required: &[&str]) -> Result<(), CoreError> {
        let status = self.status();
        if !status.valid {
            return Err(CoreError::LicenseDenied(
                status.reason.unwrap_or_else(|| "license invalid".into()),
            ));
        }
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|f| !status.features.iter().any(|have| have == f))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::LicenseDenied(format!(
                "license does not include feature: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
