//! Registry of sensitive strings used for log redaction.
//!
//! Secrets are registered once at config-load time (passwords, TLS file
//! paths, API client secrets) and every log sink that redacts asks the
//! keychain to scrub its message first. The keychain is process-wide and
//! mutex-guarded; it never persists anything.

use std::sync::{Arc, Mutex};

use crate::logging::redaction;

/// What a registered secret is, which decides its replacement token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    User,
    Password,
    Url,
}

impl SecretKind {
    fn token(self) -> &'static str {
        match self {
            SecretKind::User => "<user>",
            SecretKind::Password => "<password>",
            SecretKind::Url => "<url>",
        }
    }
}

#[derive(Debug, Clone)]
struct SecretEntry {
    value: String,
    kind: SecretKind,
}

/// Process-wide secret registry.
#[derive(Clone, Default)]
pub struct Keychain {
    entries: Arc<Mutex<Vec<SecretEntry>>>,
}

impl Keychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Empty strings are ignored, they would otherwise
    /// turn every message into replacement tokens.
    pub fn register(&self, value: impl Into<String>, kind: SecretKind) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|s| s.value == value) {
            return;
        }
        entries.push(SecretEntry { value, kind });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace every registered secret and every detected email, URL, and
    /// connection-string credential in `message` with tokens.
    pub fn redact(&self, message: &str) -> String {
        let mut out = message.to_string();
        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            // Longest first so a secret that contains another secret is
            // replaced as a whole.
            let mut sorted: Vec<&SecretEntry> = entries.iter().collect();
            sorted.sort_by_key(|s| std::cmp::Reverse(s.value.len()));
            for secret in sorted {
                if out.contains(&secret.value) {
                    out = out.replace(&secret.value, secret.kind.token());
                }
            }
        }
        redaction::redact_patterns(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_secrets_are_replaced() {
        let keychain = Keychain::new();
        keychain.register("hunter2", SecretKind::Password);
        keychain.register("admin-user", SecretKind::User);

        let redacted = keychain.redact("auth failed for admin-user with hunter2");
        assert!(!redacted.contains("hunter2"));
        assert!(!redacted.contains("admin-user"));
        assert!(redacted.contains("<password>"));
        assert!(redacted.contains("<user>"));
    }

    #[test]
    fn longer_secret_wins_over_contained_secret() {
        let keychain = Keychain::new();
        keychain.register("secret", SecretKind::Password);
        keychain.register("secret-extended", SecretKind::Url);

        let redacted = keychain.redact("value is secret-extended");
        assert_eq!(redacted, "value is <url>");
    }

    #[test]
    fn empty_secret_is_ignored() {
        let keychain = Keychain::new();
        keychain.register("", SecretKind::Password);
        assert!(keychain.is_empty());
        assert_eq!(keychain.redact("nothing here"), "nothing here");
    }

    #[test]
    fn duplicate_registration_is_deduplicated() {
        let keychain = Keychain::new();
        keychain.register("tok", SecretKind::Password);
        keychain.register("tok", SecretKind::Password);
        assert_eq!(keychain.len(), 1);
    }
}
