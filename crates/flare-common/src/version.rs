//! Version types for schema compatibility.

use serde::{Deserialize, Serialize};

/// Schema version using semantic versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version (breaking changes)
    pub major: u16,
    /// Minor version (backwards-compatible additions)
    pub minor: u16,
    /// Patch version (bug fixes)
    pub patch: u16,
}

impl SchemaVersion {
    /// Creates a new schema version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Current effect document version.
    ///
    /// Documents only carry the major number in their `version` field.
    pub const EFFECT_DOCUMENT: Self = Self::new(1, 0, 0);

    /// Checks if this version can read a document stamped with `major`.
    #[must_use]
    pub const fn can_read_major(&self, major: u32) -> bool {
        major >= 1 && major <= self.major as u32
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_version_reads_own_major() {
        let current = SchemaVersion::EFFECT_DOCUMENT;
        assert!(current.can_read_major(1));
        assert!(!current.can_read_major(0));
        assert!(!current.can_read_major(2));
    }

    #[test]
    fn test_version_display_and_serde() {
        let version = SchemaVersion::new(1, 2, 3);
        assert_eq!(version.to_string(), "1.2.3");

        let json = serde_json::to_string(&version).expect("serialize");
        let back: SchemaVersion = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, version);
    }
}
