use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier backed by ULID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(ulid::Ulid);

impl Id {
    /// Generate a new ID
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Trailing `len` characters of the encoded ID, taken from the random part
    ///
    /// `len` is clamped to 16, the number of characters that encode randomness.
    pub fn random_suffix(&self, len: usize) -> String {
        let encoded = self.0.to_string();
        let len = len.min(16);
        encoded[encoded.len() - len..].to_string()
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
