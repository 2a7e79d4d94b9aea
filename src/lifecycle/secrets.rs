//! Internal endpoint secrets
//!
//! Tracks the registered sidecar token and the one-shot server secrets issued per
//! pending transfer request.

use dashmap::DashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Secrets shared with the transfer sidecar
pub struct SecretBook {
    api_secret: String,
    sidecar: RwLock<Option<String>>,
    pending: DashMap<String, String>,
}

impl SecretBook {
    /// `api_secret` is the deployment token a sidecar must present to register
    pub fn new(api_secret: impl Into<String>) -> Self {
        Self {
            api_secret: api_secret.into(),
            sidecar: RwLock::new(None),
            pending: DashMap::new(),
        }
    }

    /// Register the sidecar's generated id. Returns false on a wrong api secret.
    pub fn register_sidecar(&self, api_secret: &str, sidecar_id: &str) -> bool {
        if !constant_time_eq(api_secret, &self.api_secret) || sidecar_id.trim().is_empty() {
            return false;
        }
        match self.sidecar.write() {
            Ok(mut guard) => {
                *guard = Some(sidecar_id.to_string());
                true
            }
            Err(_) => false,
        }
    }

    /// Currently registered sidecar, if any
    pub fn sidecar(&self) -> Option<String> {
        self.sidecar.read().ok().and_then(|guard| guard.clone())
    }

    /// Issue a fresh secret for a transfer of `model_id`, replacing any earlier one
    pub fn issue(&self, model_id: &str) -> String {
        let secret = Uuid::new_v4().simple().to_string();
        self.pending.insert(model_id.to_string(), secret.clone());
        secret
    }

    /// Consume the secret for `model_id` if `presented` matches it
    pub fn redeem(&self, model_id: &str, presented: &str) -> bool {
        self.pending
            .remove_if(model_id, |_, expected| constant_time_eq(expected, presented))
            .is_some()
    }

    /// Drop an issued secret without redeeming it
    pub fn revoke(&self, model_id: &str) {
        self.pending.remove(model_id);
    }

    pub fn is_pending(&self, model_id: &str) -> bool {
        self.pending.contains_key(model_id)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
