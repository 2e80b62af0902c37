//! Registry of evaluation states, keyed by entity ID.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::obs;
use crate::state::EvalState;
use crate::trace::TraceContext;

/// Thread-safe store of [`EvalState`]s.
///
/// Lookups share a read lock; inserting or removing entries takes the write
/// lock. Operations on an individual state never hold the cache lock.
///
/// Removing an entry with [`EvalCache::del`] does not finish the state: any
/// caller still holding the `Arc` keeps a usable, detached state. Finish it
/// explicitly when the entity is done.
#[derive(Debug, Default)]
pub struct EvalCache {
    states: RwLock<HashMap<String, Arc<EvalState>>>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the state for `id`, creating it (with a span following from
    /// `parent`) if the cache has none.
    ///
    /// Concurrent first-time callers for the same `id` all receive the same
    /// state; only one is ever created.
    pub fn get_or_create(&self, id: &str, parent: &TraceContext) -> Arc<EvalState> {
        if let Some(state) = self.get(id) {
            return state;
        }

        let mut states = self.write();
        // Re-check under the write lock: another caller may have won the race.
        Arc::clone(
            states
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(EvalState::new(id, parent))),
        )
    }

    pub fn get(&self, id: &str) -> Option<Arc<EvalState>> {
        self.read().get(id).cloned()
    }

    /// Insert `state` under its own ID, replacing any existing entry.
    pub fn put(&self, state: Arc<EvalState>) {
        self.write().insert(state.id().to_string(), state);
    }

    /// Remove the entry for `id`. The state itself is left untouched.
    pub fn del(&self, id: &str) {
        self.write().remove(id);
    }

    /// Snapshot of all entries. Changing the returned map does not affect the
    /// cache.
    pub fn list(&self) -> HashMap<String, Arc<EvalState>> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every registered state.
    ///
    /// Best effort: a state that fails to close is logged and shutdown moves on
    /// to the remaining states. Individual failures are never returned.
    pub fn close(&self) -> Result<()> {
        let states = self.list();
        let mut failures = 0;
        for (id, state) in &states {
            if let Err(e) = state.close() {
                failures += 1;
                obs::emit_close_error(id, &e);
            }
        }
        obs::emit_cache_closed(states.len(), failures);
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<EvalState>>> {
        self.states.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<EvalState>>> {
        self.states.write().unwrap_or_else(PoisonError::into_inner)
    }
}
