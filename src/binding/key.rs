//! Binding keys and the `key#path` convention.

use crate::error::{Error, Result};

/// Separates a binding key from a property path inside its value.
pub const PATH_SEPARATOR: char = '#';

/// A binding key split from its optional property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWithPath {
    pub key: String,
    pub path: Option<String>,
}

/// Builds `key#path`.
pub fn build_key_with_path(key: &str, path: &str) -> String {
    format!("{key}{PATH_SEPARATOR}{path}")
}

/// Splits `key#path` at the first separator.
pub fn parse_key_with_path(key_with_path: &str) -> KeyWithPath {
    match key_with_path.split_once(PATH_SEPARATOR) {
        Some((key, path)) => KeyWithPath {
            key: key.to_string(),
            path: Some(path.to_string()),
        },
        None => KeyWithPath {
            key: key_with_path.to_string(),
            path: None,
        },
    }
}

/// Rejects empty keys and keys containing the path separator.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidBindingKey {
            key: key.to_string(),
            reason: "binding key must not be empty",
        });
    }
    if key.contains(PATH_SEPARATOR) {
        return Err(Error::InvalidBindingKey {
            key: key.to_string(),
            reason: "binding key must not contain '#'",
        });
    }
    Ok(())
}
