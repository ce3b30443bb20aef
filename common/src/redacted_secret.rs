//! Controller secret handling with redacted output.
//!
//! The core's REST controller is protected by a bearer secret read from the
//! profile YAML. It travels from the profile loader to the HTTP client and into
//! `CoreStatus` for the UI, and must never end up in a log line on the way.

use crate::{ErrorLocation, RedactError};

use std::fmt;
use std::panic::Location;

use serde::ser::Error;
use zeroize::Zeroize;

/// A controller secret that never exposes its value through `Debug`/`Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedSecret {
    inner: String,
}

impl RedactedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Build from an optional profile value, treating blank strings as "no secret".
    pub fn from_optional(secret: Option<&str>) -> Option<Self> {
        secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    /// Raw value. Only call this when building the `Authorization` header or
    /// handing the secret to the UI on explicit request.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Value formatted as an HTTP bearer credential.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.inner)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for RedactedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedSecret([REDACTED])")
    }
}

impl fmt::Display for RedactedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED SECRET]")
    }
}

impl Drop for RedactedSecret {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

// Serializing would leak the value into JSON payloads and config files.
impl serde::Serialize for RedactedSecret {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(S::Error::custom(RedactError::Serialization {
            message: String::from("RedactedSecret cannot be serialized - use expose() explicitly"),
            location: ErrorLocation::from(Location::caller()),
        }))
    }
}
