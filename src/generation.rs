//! Generation tokens
//!
//! Every asynchronous fetch takes a [`GenerationToken`] when it starts and
//! only applies its result while that token is still current. Advancing the
//! [`Generation`] (scope change, teardown) supersedes every outstanding token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared generation counter
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

/// Snapshot of a [`Generation`] taken when an async call starts
#[derive(Debug, Clone)]
pub struct GenerationToken {
    value: u64,
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede all outstanding tokens and return a token for the new generation
    pub fn advance(&self) -> GenerationToken {
        let value = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            value,
            current: Arc::clone(&self.current),
        }
    }

    /// Token for the current generation
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            value: self.current.load(Ordering::SeqCst),
            current: Arc::clone(&self.current),
        }
    }

    pub fn value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl GenerationToken {
    /// Whether no newer generation has started
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.value
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}
