//! Qualified names
//!
//! Function and type names of the source language are case-insensitive. A
//! `QualifiedName` keeps the declared spelling for display and compares,
//! hashes and orders by its lowercase key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct QualifiedName {
    display: String,
    key: String,
}

impl QualifiedName {
    /// Leading namespace separators are dropped: `\Foo\Bar` is `Foo\Bar`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let display = name.as_ref().trim_start_matches('\\').to_string();
        let key = display.to_ascii_lowercase();
        Self { display, key }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Lowercase lookup key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Case-insensitive comparison with a plain name
    pub fn is(&self, other: &str) -> bool {
        self.key == other.trim_start_matches('\\').to_ascii_lowercase()
    }

    /// Last namespace segment
    pub fn short_name(&self) -> &str {
        self.display.rsplit('\\').next().unwrap_or(&self.display)
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for QualifiedName {}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for QualifiedName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualifiedName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.display)
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for QualifiedName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.display
    }
}
