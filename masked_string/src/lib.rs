//! A wrapper around owned strings that masks the value when printed or
//! formatted for debugging, so credentials never end up in log output.
//!
//! Serde serialization and deserialization pass the real value through.
//!
//! # Examples
//! ```
//! use masked_string::MaskedString;
//! let secret = MaskedString::new("hunter2");
//! assert_eq!(format!("{}", secret), "*******");
//! assert_eq!(format!("{:?}", secret), "MaskedString(*******)");
//! assert_eq!(secret.value(), "hunter2");
//! ```

#![deny(warnings)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::fmt::Debug;

/// An owned string whose Display and Debug output is replaced by asterisks.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaskedString(String);

impl MaskedString {
    pub fn new(value: impl Into<String>) -> Self {
        MaskedString(value.into())
    }

    /// The real, unmasked value.
    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Asterisks matching the length of the wrapped value.
    pub fn masked(&self) -> String {
        "*".repeat(self.0.len())
    }
}

impl From<String> for MaskedString {
    fn from(value: String) -> Self {
        MaskedString(value)
    }
}

impl From<&str> for MaskedString {
    fn from(value: &str) -> Self {
        MaskedString(value.to_string())
    }
}

impl std::fmt::Display for MaskedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

impl Debug for MaskedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MaskedString({})", self.masked())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MaskedString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.value())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MaskedString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(MaskedString(String::deserialize(deserializer)?))
    }
}
