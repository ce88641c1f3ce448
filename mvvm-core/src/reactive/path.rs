//! Field paths.
//!
//! A watcher observes either a single key (`count`) or a dotted path into
//! nested mappings (`user.name`). Every segment must be a non-empty key.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{BindError, Result};

/// A parsed key path into a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: SmallVec<[String; 4]>,
}

impl FieldPath {
    /// Parse a dotted path. Surrounding whitespace is ignored.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let segments: SmallVec<[String; 4]> = trimmed
            .split('.')
            .map(|segment| segment.trim().to_string())
            .collect();

        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(BindError::InvalidPath {
                path: path.to_string(),
            });
        }

        Ok(Self { segments })
    }

    /// A path of exactly one key.
    pub fn key(key: impl Into<String>) -> Self {
        let mut segments = SmallVec::new();
        segments.push(key.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final key of the path.
    pub fn last(&self) -> &str {
        // Parsing guarantees at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// All segments except the last.
    pub fn parent(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    pub fn is_single_key(&self) -> bool {
        self.segments.len() == 1
    }
}

impl FromStr for FieldPath {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
