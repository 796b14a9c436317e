// src/ids.rs
//! Comment id generation.
//!
//! Ids are minted through an injected generator so tests get deterministic
//! values and two comments created in the same instant can never collide.
//! Generated ids never contain `:`, which the marker codec relies on.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of fresh comment ids
pub trait IdGenerator {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs, the production default
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Monotonic `prefix` + counter ids (`c1`, `c2`, ...)
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.replace(':', "-"),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("c")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::default();
        assert_eq!(ids.next_id(), "c1");
        assert_eq!(ids.next_id(), "c2");
        assert_eq!(ids.next_id(), "c3");
    }

    #[test]
    fn test_sequential_prefix_is_colon_free() {
        let ids = SequentialIdGenerator::new("a:b");
        assert_eq!(ids.next_id(), "a-b1");
    }

    #[test]
    fn test_uuid_ids_are_unique_and_colon_free() {
        let ids = UuidGenerator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(!a.contains(':'));
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
