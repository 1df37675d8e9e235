//! Time-windowed record cache.

use std::collections::VecDeque;
use std::time::Duration;

use lpp_relay_core::Record;

/// Ordered window of recently ingested records.
///
/// Entries older than the retention period, measured against the newest
/// insert, are evicted before each insert. Records sharing a timestamp are
/// all kept.
#[derive(Debug, Clone)]
pub struct NmeaWindow {
    retention: Duration,
    entries: VecDeque<Record>,
}

impl NmeaWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            entries: VecDeque::new(),
        }
    }

    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Evict expired entries, then append `record`.
    pub fn insert(&mut self, record: Record) {
        let now = record.received_at();
        let retention = self.retention;
        self.entries.retain(|entry| entry.age_at(now) < retention);
        self.entries.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter()
    }

    /// Sentence text of every retained record, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.line().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const WINDOW: Duration = Duration::from_secs(30);

    #[test]
    fn test_exactly_window_age_is_evicted() {
        let t0 = Instant::now();
        let mut window = NmeaWindow::new(WINDOW);
        window.insert(Record::new("$OLD", t0));
        window.insert(Record::new("$NEW", t0 + Duration::from_millis(30_000)));
        assert_eq!(window.snapshot(), ["$NEW"]);
    }

    #[test]
    fn test_just_inside_window_is_kept() {
        let t0 = Instant::now();
        let mut window = NmeaWindow::new(WINDOW);
        window.insert(Record::new("$OLD", t0));
        window.insert(Record::new("$NEW", t0 + Duration::from_millis(29_999)));
        assert_eq!(window.snapshot(), ["$OLD", "$NEW"]);
    }

    #[test]
    fn test_same_timestamp_records_both_kept() {
        let t0 = Instant::now();
        let mut window = NmeaWindow::new(WINDOW);
        window.insert(Record::new("$A", t0));
        window.insert(Record::new("$B", t0));
        assert_eq!(window.snapshot(), ["$A", "$B"]);
    }

    #[test]
    fn test_window_matches_age_predicate() {
        let t0 = Instant::now();
        let offsets = [0u64, 5, 12, 29, 33, 41, 41, 60, 75, 89, 90];
        let mut window = NmeaWindow::new(WINDOW);

        for (n, &secs) in offsets.iter().enumerate() {
            let now = t0 + Duration::from_secs(secs);
            window.insert(Record::new(format!("${n}"), now));

            let expected: Vec<String> = offsets[..=n]
                .iter()
                .enumerate()
                .filter(|&(_, &s)| Duration::from_secs(secs - s) < WINDOW)
                .map(|(i, _)| format!("${i}"))
                .collect();
            assert_eq!(window.snapshot(), expected, "after insert {n}");
        }
    }
}
