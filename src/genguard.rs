use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

/// How long a caller waits for an in-flight generation before giving up with
/// a transient error.
const GENERATION_WAIT: Duration = Duration::from_secs(10);

/// Mutual exclusion for weekly-instance generation, keyed by timetable id.
///
/// While a generation is in flight for a timetable, later callers block until
/// it finishes (then find the winner's row on re-lookup) instead of issuing a
/// duplicate create. The permit releases on drop, so an abandoned or failed
/// generation never leaves the key held.
pub struct GenerationGuard {
    in_flight: Mutex<HashSet<String>>,
    released: Condvar,
}

impl GenerationGuard {
    pub fn new() -> Self {
        GenerationGuard {
            in_flight: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    pub fn acquire(&self, timetable_id: &str) -> Result<GenerationPermit<'_>> {
        let deadline = Instant::now() + GENERATION_WAIT;
        // A poisoned set only means a prior generation panicked mid-flight;
        // the set itself is still usable.
        let mut held = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while held.contains(timetable_id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::ConcurrentGenerationInProgress(
                    timetable_id.to_string(),
                ));
            }
            let (guard, timeout) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            held = guard;
            if timeout.timed_out() && held.contains(timetable_id) {
                return Err(EngineError::ConcurrentGenerationInProgress(
                    timetable_id.to_string(),
                ));
            }
        }
        held.insert(timetable_id.to_string());
        Ok(GenerationPermit {
            guard: self,
            timetable_id: timetable_id.to_string(),
        })
    }
}

impl Default for GenerationGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GenerationPermit<'a> {
    guard: &'a GenerationGuard,
    timetable_id: String,
}

impl Drop for GenerationPermit<'_> {
    fn drop(&mut self) {
        let mut held = self
            .guard
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        held.remove(&self.timetable_id);
        self.guard.released.notify_all();
    }
}
