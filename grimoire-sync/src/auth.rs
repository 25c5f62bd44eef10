//! Shared-secret check for the push path.
//!
//! The expected secret is kept only as a SHA-256 digest. Incoming tokens are
//! hashed the same way and compared in constant time, so neither the secret
//! length nor a matching prefix leaks through timing.

use std::fmt;

use sha2::{Digest, Sha256};

/// Header carrying the push credential.
pub const SECRET_HEADER: &str = "grimoire-secret";

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential was presented.
    Missing,
    /// A credential was presented but did not match.
    Invalid,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Missing => write!(f, "missing {SECRET_HEADER} header"),
            AuthFailure::Invalid => write!(f, "invalid {SECRET_HEADER}"),
        }
    }
}

#[derive(Clone)]
pub struct SecretGate {
    expected: [u8; 32],
}

impl fmt::Debug for SecretGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretGate")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl SecretGate {
    pub fn new(secret: impl AsRef<str>) -> Self {
        Self {
            expected: digest(secret.as_ref()),
        }
    }

    /// Accept `token` only if it equals the configured secret.
    pub fn check(&self, token: Option<&str>) -> Result<(), AuthFailure> {
        let token = token.ok_or(AuthFailure::Missing)?;
        let presented = digest(token);
        let diff = self
            .expected
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(AuthFailure::Invalid)
        }
    }

    /// Short hex prefix of the secret digest, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.expected[..4])
    }
}

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secret_is_accepted() {
        let gate = SecretGate::new("IDidntSetASecret");
        assert_eq!(gate.check(Some("IDidntSetASecret")), Ok(()));
    }

    #[test]
    fn missing_and_wrong_secrets_are_distinguished() {
        let gate = SecretGate::new("s3cret");
        assert_eq!(gate.check(None), Err(AuthFailure::Missing));
        assert_eq!(gate.check(Some("s3cre")), Err(AuthFailure::Invalid));
        assert_eq!(gate.check(Some("")), Err(AuthFailure::Invalid));
    }

    #[test]
    fn debug_output_never_shows_the_secret() {
        let gate = SecretGate::new("hunter2");
        let shown = format!("{gate:?}");
        assert!(!shown.contains("hunter2"));
        assert_eq!(gate.fingerprint().len(), 8);
    }
}
