//! Generation-tracking registry of compiled validators
//!
//! Architecture: Snapshot Isolation - Readers always see one whole generation
//! - `configure` submits every source before publishing the new generation
//! - The swap is a single pointer replacement behind an `RwLock`
//! - Handles of the replaced generation are superseded after the swap

use crate::domain::WardenResult;
use crate::pipeline::RuleSetSource;
use crate::pool::{CompilationHandle, CompilationPool};
use std::sync::{Arc, PoisonError, RwLock};

/// One configured set of rule sets and their compilations
#[derive(Debug)]
pub struct Generation {
    number: u64,
    sources: Vec<RuleSetSource>,
    handles: Vec<CompilationHandle>,
}

impl Generation {
    fn empty() -> Self {
        Self { number: 0, sources: Vec::new(), handles: Vec::new() }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn sources(&self) -> &[RuleSetSource] {
        &self.sources
    }

    /// Handles in configured order, one per source
    pub fn handles(&self) -> &[CompilationHandle] {
        &self.handles
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Holds the current generation of compilation handles
#[derive(Debug)]
pub struct ValidatorRegistry {
    pool: Arc<CompilationPool>,
    current: RwLock<Arc<Generation>>,
}

impl ValidatorRegistry {
    pub fn new(pool: Arc<CompilationPool>) -> Self {
        Self { pool, current: RwLock::new(Arc::new(Generation::empty())) }
    }

    /// Replace the configured rule sets, returning the new generation number
    pub fn configure(&self, sources: Vec<RuleSetSource>) -> WardenResult<u64> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let number = current.number + 1;

        let count = sources.len();
        let mut handles = Vec::with_capacity(count);
        for source in &sources {
            match self.pool.submit(source.clone(), number) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        handle.cancel();
                    }
                    return Err(e);
                }
            }
        }

        let next = Arc::new(Generation { number, sources, handles });
        let previous = std::mem::replace(&mut *current, next);
        drop(current);

        for handle in previous.handles() {
            handle.supersede();
        }

        tracing::info!(
            "Configured {} rule set(s) as generation {} (superseded generation {})",
            count,
            number,
            previous.number
        );
        Ok(number)
    }

    /// The current generation as one consistent value
    pub fn snapshot(&self) -> Arc<Generation> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().number
    }

    pub fn pool(&self) -> &Arc<CompilationPool> {
        &self.pool
    }
}
