use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-empty identifier, unique within a registry instance. Matches
/// `^[A-Za-z0-9_\-:.]+$`, length <= 128.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device id must not be empty")]
    Empty,
    #[error("device id exceeds 128 bytes")]
    TooLong,
    #[error("device id contains characters outside [A-Za-z0-9_-:.]")]
    InvalidCharacters,
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, DeviceIdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DeviceIdError::Empty);
        }
        if raw.len() > 128 {
            return Err(DeviceIdError::TooLong);
        }
        if !raw.chars().all(is_allowed) {
            return Err(DeviceIdError::InvalidCharacters);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DeviceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_ids() {
        assert!(DeviceId::new("tc1").is_ok());
        assert!(DeviceId::new("laser_controller:0").is_ok());
        assert!(DeviceId::new("node.1-a").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(DeviceId::new(""), Err(DeviceIdError::Empty));
    }

    #[test]
    fn rejects_invalid_characters() {
        assert_eq!(
            DeviceId::new("bad id!"),
            Err(DeviceIdError::InvalidCharacters)
        );
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(129);
        assert_eq!(DeviceId::new(long), Err(DeviceIdError::TooLong));
    }
}
