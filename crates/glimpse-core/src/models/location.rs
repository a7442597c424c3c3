//! Object locations.
//!
//! A [`Location`] is a `scheme://path` string. The scheme selects the store
//! that owns the object, the path addresses it inside that store. Paths are
//! normalised by rejection: empty, `.` and `..` segments, leading slashes and
//! backslashes are refused, so two distinct Locations never alias the same
//! backend object.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const SCHEME_SEPARATOR: &str = "://";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Location '{0}' has no scheme (expected scheme://path)")]
    MissingScheme(String),

    #[error("Invalid scheme in location '{0}'")]
    InvalidScheme(String),

    #[error("Location '{0}' has an empty path")]
    EmptyPath(String),

    #[error("Invalid path in location '{location}': {reason}")]
    InvalidPath { location: String, reason: String },
}

/// Immutable, structurally compared object address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    raw: String,
    scheme_len: usize,
}

impl Location {
    pub fn parse(raw: impl Into<String>) -> Result<Self, LocationError> {
        let raw = raw.into();
        let Some(scheme_len) = raw.find(SCHEME_SEPARATOR) else {
            return Err(LocationError::MissingScheme(raw));
        };

        if !is_valid_scheme(&raw[..scheme_len]) {
            return Err(LocationError::InvalidScheme(raw));
        }

        let path = &raw[scheme_len + SCHEME_SEPARATOR.len()..];
        if path.is_empty() {
            return Err(LocationError::EmptyPath(raw));
        }
        if let Err(reason) = validate_path(path) {
            return Err(LocationError::InvalidPath {
                location: raw,
                reason: reason.to_string(),
            });
        }

        Ok(Self { raw, scheme_len })
    }

    /// Build a Location from its parts, e.g. `("blob", "images/cat.png")`.
    pub fn from_parts(scheme: &str, path: &str) -> Result<Self, LocationError> {
        Self::parse(format!("{}{}{}", scheme, SCHEME_SEPARATOR, path))
    }

    pub fn scheme(&self) -> &str {
        &self.raw[..self.scheme_len]
    }

    pub fn path(&self) -> &str {
        &self.raw[self.scheme_len + SCHEME_SEPARATOR.len()..]
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path().rsplit('/').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn validate_path(path: &str) -> Result<(), &'static str> {
    if path.starts_with('/') {
        return Err("path must not start with '/'");
    }
    if path.contains('\\') {
        return Err("path must not contain '\\'");
    }
    if path.chars().any(char::is_control) {
        return Err("path must not contain control characters");
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err("path contains an empty segment"),
            "." | ".." => return Err("path contains a relative segment"),
            _ => {}
        }
    }
    Ok(())
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Location {
    type Error = LocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.raw
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.raw)
    }
}
