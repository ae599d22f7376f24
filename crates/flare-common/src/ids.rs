//! ID types for emitters and their GPU resources.

use serde::{Deserialize, Serialize};

/// Unique identifier for an emitter.
///
/// Keys the per-emitter GPU resource sets, so it stays stable for the
/// emitter's whole lifetime even when the emitter is renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmitterId(u64);

impl EmitterId {
    /// Creates an emitter ID from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid emitter ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) emitter ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

/// Hands out emitter IDs for one session.
///
/// Owned by whoever owns the emitters; there is no process-wide counter.
#[derive(Debug, Clone)]
pub struct EmitterIdAllocator {
    next: u64,
}

impl Default for EmitterIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl EmitterIdAllocator {
    /// Allocates the next unused ID.
    pub fn allocate(&mut self) -> EmitterId {
        let id = EmitterId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_id() {
        assert!(!EmitterId::NULL.is_valid());
        assert_eq!(EmitterId::from_raw(7).raw(), 7);
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let mut ids = EmitterIdAllocator::default();
        let a = ids.allocate();
        let b = ids.allocate();
        assert!(b > a);
        assert_eq!(a.to_string(), "emitter#1");
    }
}
