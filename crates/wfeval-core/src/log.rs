//! Append-only evaluation history of one entity.

use chrono::{DateTime, Duration, Utc};

use crate::record::EvalRecord;

/// Time-ordered log of evaluation records. Newer records are appended to the
/// end; nothing is ever removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct EvalLog {
    records: Vec<EvalRecord>,
}

impl EvalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the end of the log.
    pub fn record(&mut self, record: EvalRecord) {
        self.records.push(record);
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at position `i`, or `None` when out of range.
    pub fn get(&self, i: usize) -> Option<&EvalRecord> {
        self.records.get(i)
    }

    pub fn first(&self) -> Option<&EvalRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&EvalRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvalRecord> {
        self.records.iter()
    }

    /// Number of most recent records that carry an error, stopping at the
    /// first successful evaluation. Input for backoff decisions.
    pub fn consecutive_errors(&self) -> usize {
        self.records
            .iter()
            .rev()
            .take_while(|r| r.is_error())
            .count()
    }

    /// Time elapsed between the last evaluation and `now`.
    pub fn since_last(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last().map(|r| now - r.timestamp)
    }
}

impl<'a> IntoIterator for &'a EvalLog {
    type Item = &'a EvalRecord;
    type IntoIter = std::slice::Iter<'a, EvalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
