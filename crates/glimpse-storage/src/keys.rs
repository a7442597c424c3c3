//! Shared Location → key and key → fetch URL mapping for storage backends.

use glimpse_core::Location;

use crate::traits::{StorageError, StorageResult};

/// Resolve the backend key for `location`, refusing Locations owned by another store.
pub fn storage_key<'a>(scheme: &str, location: &'a Location) -> StorageResult<&'a str> {
    if location.scheme() != scheme {
        return Err(StorageError::UnsupportedScheme {
            expected: scheme.to_string(),
            location: location.to_string(),
        });
    }
    Ok(location.path())
}

/// Public URL for a key: each path segment is percent-encoded and appended to `base_url`.
pub fn fetch_url(base_url: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}
