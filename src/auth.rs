//! Shared-secret credential check for the HTTP surfaces.
//!
//! Exact string match only. The comparison is constant-time so a caller
//! cannot learn the secret byte-by-byte from response timing.

/// Guard that validates a presented `X-API-Key` value against the
/// configured shared secret.
pub struct CredentialGuard {
    expected: String,
}

impl CredentialGuard {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// `true` only for a non-empty, exact match of the configured secret.
    pub fn verify(&self, presented: &str) -> bool {
        if presented.is_empty() {
            return false;
        }
        constant_time_eq(presented, &self.expected)
    }
}

/// Constant-time equality comparison for secret strings.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
