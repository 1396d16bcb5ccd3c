//! Anonymous device identifier.
//!
//! The device id is the SHA-256 digest of the machine hostname, resolved
//! once per process with a bounded timeout. Telemetry buffers events
//! until resolution completes or times out.

use std::time::Duration;

use ring::digest;
use tokio::time::timeout;

/// Upper bound on hostname resolution; past this, events flush without a
/// device id.
pub const DEVICE_ID_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolve the device id, or `None` on timeout/failure.
pub async fn resolve_device_id() -> Option<String> {
    match timeout(DEVICE_ID_TIMEOUT, compute()).await {
        Ok(id) => id,
        Err(_) => None,
    }
}

async fn compute() -> Option<String> {
    // gethostname is cheap but the digest runs off the async path anyway.
    let handle = tokio::task::spawn_blocking(|| {
        let name = hostname::get().ok()?;
        Some(digest_hex(name.to_string_lossy().as_bytes()))
    });
    handle.await.ok().flatten()
}

fn digest_hex(input: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, input);
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let a = digest_hex(b"machine-1");
        let b = digest_hex(b"machine-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(digest_hex(b"machine-1"), digest_hex(b"machine-2"));
    }

    #[tokio::test]
    async fn resolution_completes_within_timeout() {
        let id = resolve_device_id().await;
        // Hostname lookup can fail in sandboxes; when it succeeds the id
        // must be a full digest.
        if let Some(id) = id {
            assert_eq!(id.len(), 64);
        }
    }
}
