//! Shared-secret token check applied to every media endpoint.

use crate::FetchError;

#[derive(Debug, Clone, Default)]
pub struct TokenGuard {
    expected: Option<String>,
}

impl TokenGuard {
    /// `None` disables the check
    pub fn new(expected: Option<String>) -> Self {
        Self { expected }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Byte-for-byte comparison against the configured token
    pub fn verify(&self, provided: Option<&str>) -> Result<(), FetchError> {
        match (&self.expected, provided) {
            (None, _) => Ok(()),
            (Some(expected), Some(token)) if token.as_bytes() == expected.as_bytes() => Ok(()),
            _ => Err(FetchError::Unauthorized),
        }
    }
}
