//! Shared webhook intake: signature verification and label-change detection
//!
//! GitHub-family deliveries are authenticated with an HMAC-SHA256 hex digest
//! of the raw body (`x-hub-signature-256: sha256=<hex>`); GitLab-family
//! deliveries carry a shared token compared exactly. An empty configured
//! secret disables GitHub verification.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(signature) = signature else {
        return false;
    };
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // Constant-time comparison.
    mac.verify_slice(&expected).is_ok()
}

pub fn verify_gitlab_token(secret: &str, header: Option<&str>) -> bool {
    header.unwrap_or("") == secret
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelRef {
    #[serde(default)]
    pub name: String,
}

/// The `changes.labels` block of a GitLab webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelChanges {
    #[serde(default)]
    pub current: Vec<LabelRef>,
    #[serde(default)]
    pub previous: Vec<LabelRef>,
}

/// A label-added transition: present in the current set, absent previously.
pub fn label_added(changes: &LabelChanges, label: &str) -> bool {
    if changes.previous.iter().any(|l| l.name == label) {
        return false;
    }
    changes.current.iter().any(|l| l.name == label)
}
