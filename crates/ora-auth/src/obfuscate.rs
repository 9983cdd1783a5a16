//! Reversible in-memory obfuscation of secrets.

use std::fmt;

use rand::RngCore;

use crate::error::AuthError;

/// A secret held XOR-masked with a random pad of the same length.
///
/// The clear text only exists transiently inside [`Secret::reveal`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    masked: Vec<u8>,
    pad: Vec<u8>,
}

impl Secret {
    /// Obfuscate the given value.
    #[must_use]
    pub fn new(value: &str) -> Self {
        let mut pad = vec![0u8; value.len()];
        rand::thread_rng().fill_bytes(&mut pad);
        let masked = value
            .as_bytes()
            .iter()
            .zip(&pad)
            .map(|(b, p)| b ^ p)
            .collect();
        Self { masked, pad }
    }

    /// Restore the clear text.
    pub fn reveal(&self) -> Result<String, AuthError> {
        let clear: Vec<u8> = self
            .masked
            .iter()
            .zip(&self.pad)
            .map(|(b, p)| b ^ p)
            .collect();
        String::from_utf8(clear).map_err(|_| AuthError::CorruptedSecret)
    }

    /// Length of the secret in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masked.len()
    }

    /// Whether the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masked.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(feature = "zeroize")]
impl Drop for Secret {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.masked.zeroize();
        self.pad.zeroize();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_restores_value() {
        let secret = Secret::new("tiger");
        assert_eq!(secret.reveal().unwrap(), "tiger");
        assert_eq!(secret.len(), 5);
    }

    #[test]
    fn test_masked_differs_from_clear_text() {
        // a 64-byte all-zero pad is vanishingly unlikely
        let value = "x".repeat(64);
        let secret = Secret::new(&value);
        assert_ne!(secret.masked, value.as_bytes());
    }

    #[test]
    fn test_debug_redacts() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }

    #[test]
    fn test_empty_secret() {
        let secret = Secret::new("");
        assert!(secret.is_empty());
        assert_eq!(secret.reveal().unwrap(), "");
    }
}
