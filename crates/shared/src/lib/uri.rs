use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier and locator. Equality is byte-wise; no normalization
/// is performed, so `http://a/` and `http://a` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("URI must not be blank")]
pub struct InvalidUri;

impl Uri {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidUri> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(InvalidUri);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Uri> for String {
    fn from(value: Uri) -> Self {
        value.0
    }
}

impl FromStr for Uri {
    type Err = InvalidUri;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
