//! Watermarks and the invalidation journal.
//!
//! The journal is the write-side fence of the cache. Every invalidation bumps
//! a global sequence and remembers, per scope, the sequence at which that
//! scope was last invalidated. A population captures a [`Watermark`] before
//! it reads the store; when it comes back, the value is admitted only if no
//! scope covering its key was invalidated after that watermark.
//!
//! Admission checks hold the journal's read lock and invalidations hold its
//! write lock for the whole bump-and-remove step, so an insert can never slip
//! in between an invalidation being recorded and the matching entries being
//! dropped.

use super::{CacheKey, Invalidation};
use atrium_core::{AtriumResult, CacheError};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A point in the invalidation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Watermark {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl Watermark {
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }
}

#[derive(Debug, Default)]
struct JournalState {
    sequence: u64,
    /// Watermarks older than this are refused; scope history below it is gone.
    floor: u64,
    scopes: HashMap<Invalidation, u64>,
}

impl JournalState {
    fn admits(&self, key: &CacheKey, observed: Watermark) -> bool {
        if observed.sequence < self.floor {
            return false;
        }
        key.covering_scopes().iter().all(|scope| {
            self.scopes
                .get(scope)
                .map_or(true, |&last| last <= observed.sequence)
        })
    }
}

/// Invalidation history shared by every cache operation.
#[derive(Debug)]
pub struct InvalidationJournal {
    state: RwLock<JournalState>,
    capacity: usize,
}

impl InvalidationJournal {
    /// `capacity` bounds how many scopes are remembered before the history is
    /// folded into the floor.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn current_watermark(&self) -> AtriumResult<Watermark> {
        Ok(self.fence_read()?.current())
    }

    /// Number of scopes currently remembered.
    pub fn len(&self) -> AtriumResult<usize> {
        Ok(self.fence_read()?.state.scopes.len())
    }

    pub fn is_empty(&self) -> AtriumResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn fence_read(&self) -> AtriumResult<FenceRead<'_>> {
        let state = self.state.read().map_err(|_| CacheError::LockPoisoned {
            component: "journal",
        })?;
        Ok(FenceRead { state })
    }

    pub fn fence_write(&self) -> AtriumResult<FenceWrite<'_>> {
        let state = self.state.write().map_err(|_| CacheError::LockPoisoned {
            component: "journal",
        })?;
        Ok(FenceWrite {
            state,
            capacity: self.capacity,
        })
    }
}

impl Default for InvalidationJournal {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Shared hold on the journal. Invalidations wait while any fence is held.
pub struct FenceRead<'a> {
    state: RwLockReadGuard<'a, JournalState>,
}

impl FenceRead<'_> {
    pub fn current(&self) -> Watermark {
        Watermark::new(self.state.sequence)
    }

    /// Whether a value read from the store at `observed` may enter `key`.
    pub fn admits(&self, key: &CacheKey, observed: Watermark) -> bool {
        self.state.admits(key, observed)
    }
}

/// Exclusive hold on the journal.
pub struct FenceWrite<'a> {
    state: RwLockWriteGuard<'a, JournalState>,
    capacity: usize,
}

impl FenceWrite<'_> {
    /// Record an invalidation of `scope` and return its watermark.
    pub fn record(&mut self, scope: Invalidation) -> Watermark {
        let state = &mut *self.state;
        state.sequence += 1;
        let sequence = state.sequence;
        state.scopes.insert(scope, sequence);
        if state.scopes.len() > self.capacity {
            state.floor = sequence;
            state.scopes.clear();
            tracing::debug!(floor = sequence, "invalidation journal folded into floor");
        }
        Watermark::new(sequence)
    }
}
