//! Process-wide evaluation counters.
//!
//! Each counter tracks one transition of the evaluation lifecycle and is bumped
//! by the core itself, never by controllers. [`Metrics::flush`] reports all of
//! them in one `info!` event; the daemon calls it once at shutdown.
//!
//! Counters only grow (until [`Metrics::reset`]), so the difference
//! `states_created - states_finished` is the number of states still open,
//! including states deleted from a cache without being finished.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every cache and driver in the process.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    states_created: AtomicU64,
    evaluations_recorded: AtomicU64,
    lock_contended: AtomicU64,
    states_finished: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            states_created: AtomicU64::new(0),
            evaluations_recorded: AtomicU64::new(0),
            lock_contended: AtomicU64::new(0),
            states_finished: AtomicU64::new(0),
        }
    }

    /// One evaluation state was constructed (and its span opened).
    pub fn inc_states_created(&self) {
        bump(&self.states_created, "states_created");
    }

    /// One record was appended to some state's log, whether the evaluation
    /// produced an action, an error, or nothing.
    pub fn inc_evaluations_recorded(&self) {
        bump(&self.evaluations_recorded, "evaluations_recorded");
    }

    /// A driver gave up on an evaluation because another caller held the
    /// token: either the non-blocking poll failed or the bounded wait ran out.
    /// Waits that eventually acquire the token are not counted.
    pub fn inc_lock_contended(&self) {
        bump(&self.lock_contended, "lock_contended");
    }

    /// A state made its single transition to finished. Repeated `finish`
    /// calls on the same state do not count again.
    pub fn inc_states_finished(&self) {
        bump(&self.states_finished, "states_finished");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            states_created = self.states_created(),
            evaluations_recorded = self.evaluations_recorded(),
            lock_contended = self.lock_contended(),
            states_finished = self.states_finished(),
            states_open = self.states_open(),
        );
    }

    pub fn states_created(&self) -> u64 {
        self.states_created.load(Ordering::Relaxed)
    }

    pub fn evaluations_recorded(&self) -> u64 {
        self.evaluations_recorded.load(Ordering::Relaxed)
    }

    pub fn lock_contended(&self) -> u64 {
        self.lock_contended.load(Ordering::Relaxed)
    }

    pub fn states_finished(&self) -> u64 {
        self.states_finished.load(Ordering::Relaxed)
    }

    /// States created but not yet finished. Saturates at zero when read
    /// between the two loads of a concurrent finish.
    pub fn states_open(&self) -> u64 {
        self.states_created().saturating_sub(self.states_finished())
    }

    /// Zero every counter. Tests only; production counters never go back.
    pub fn reset(&self) {
        for counter in [
            &self.states_created,
            &self.evaluations_recorded,
            &self.lock_contended,
            &self.states_finished,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn bump(counter: &AtomicU64, metric: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric, "counter incremented");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_states_follow_create_and_finish() {
        let m = Metrics::new();
        m.inc_states_created();
        m.inc_states_created();
        m.inc_states_created();
        m.inc_states_finished();
        assert_eq!(m.states_open(), 2);

        m.inc_states_finished();
        m.inc_states_finished();
        assert_eq!(m.states_open(), 0);
    }

    #[test]
    fn test_open_states_never_underflow() {
        let m = Metrics::new();
        m.inc_states_finished();
        assert_eq!(m.states_open(), 0);
    }

    #[test]
    fn test_each_event_bumps_only_its_counter() {
        let m = Metrics::new();
        m.inc_lock_contended();
        m.inc_lock_contended();
        m.inc_evaluations_recorded();

        assert_eq!(m.lock_contended(), 2);
        assert_eq!(m.evaluations_recorded(), 1);
        assert_eq!(m.states_created(), 0);
        assert_eq!(m.states_finished(), 0);
    }

    #[test]
    fn test_reset_returns_to_fresh_state() {
        let m = Metrics::new();
        m.inc_states_created();
        m.inc_evaluations_recorded();
        m.inc_lock_contended();
        m.inc_states_finished();

        m.reset();
        assert_eq!(
            (
                m.states_created(),
                m.evaluations_recorded(),
                m.lock_contended(),
                m.states_finished(),
            ),
            (0, 0, 0, 0)
        );
    }
}
