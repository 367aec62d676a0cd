//! Identity tokens used as surrogate keys before persistence.
//!
//! # Invariants
//! - `ProcessIdentity` tokens are unique within one running process across
//!   every model type. Uniqueness across processes or restarts is not a goal.
//! - A token is handed out once and never reissued by the same generator.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix shared by every generated identity token.
pub const TOKEN_PREFIX: &str = "cid";

static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Source of identity tokens, injectable per model type.
pub trait IdentityGenerator {
    fn next_token(&self) -> String;
}

/// Default generator backed by one process-wide monotonic counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessIdentity;

impl IdentityGenerator for ProcessIdentity {
    fn next_token(&self) -> String {
        let value = PROCESS_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{TOKEN_PREFIX}{value}")
    }
}

/// Deterministic generator for tests and replay tooling.
#[derive(Debug)]
pub struct SequenceIdentity {
    prefix: String,
    next: Cell<u64>,
}

impl SequenceIdentity {
    pub fn new(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: Cell::new(start),
        }
    }
}

impl Default for SequenceIdentity {
    fn default() -> Self {
        Self::new(TOKEN_PREFIX, 1)
    }
}

impl IdentityGenerator for SequenceIdentity {
    fn next_token(&self) -> String {
        let value = self.next.get();
        self.next.set(value + 1);
        format!("{}{value}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityGenerator, ProcessIdentity, SequenceIdentity};
    use std::collections::HashSet;

    #[test]
    fn process_identity_never_repeats() {
        let generator = ProcessIdentity;
        let tokens: HashSet<String> = (0..256).map(|_| generator.next_token()).collect();
        assert_eq!(tokens.len(), 256);
        assert!(tokens.iter().all(|token| token.starts_with("cid")));
    }

    #[test]
    fn sequence_identity_is_deterministic() {
        let generator = SequenceIdentity::new("tmp", 10);
        assert_eq!(generator.next_token(), "tmp10");
        assert_eq!(generator.next_token(), "tmp11");
    }
}
