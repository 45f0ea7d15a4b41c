//! ErrorAggregator (C2): deduplicates, prioritizes and renders the
//! multi-iteration failures an IterationEngine feeds back to the agent.

use std::collections::HashMap;

use crate::domain::{ErrorEntry, ErrorKind, Severity};

const DEFAULT_MAX_ERRORS: usize = 100;

fn kind_rank(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Build => 0,
        ErrorKind::Lint => 1,
        ErrorKind::Test => 2,
        ErrorKind::Review => 3,
        ErrorKind::Runtime => 4,
    }
}

/// Holds at most `max_errors` entries, trimming the oldest (by iteration,
/// then insertion order) when the cap is exceeded.
pub struct ErrorAggregator {
    max_errors: usize,
    entries: Vec<ErrorEntry>,
    recurrence: HashMap<(ErrorKind, String), usize>,
}

impl ErrorAggregator {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            entries: Vec::new(),
            recurrence: HashMap::new(),
        }
    }

    /// Add a batch of errors, deduplicating by `(kind, message, path, line)`.
    /// Among duplicates the entry with the higher iteration-of-origin wins.
    /// Recurrence of a `(kind, message)` pair is tracked independently of
    /// that dedup: QA-sourced errors rarely carry a path/line, so the same
    /// failure recurring iteration after iteration would otherwise collapse
    /// into a single entry and never trip the repeated-failure threshold.
    pub fn add(&mut self, errors: Vec<ErrorEntry>) {
        for incoming in errors {
            *self.recurrence.entry((incoming.kind, incoming.message.clone())).or_insert(0) += 1;

            let key = incoming.dedup_key();
            if let Some(existing) = self
                .entries
                .iter_mut()
                .find(|e| e.dedup_key() == key)
            {
                if incoming.iteration > existing.iteration {
                    *existing = incoming;
                }
                continue;
            }
            self.entries.push(incoming);
        }

        if self.entries.len() > self.max_errors {
            self.entries.sort_by_key(|e| e.iteration);
            let overflow = self.entries.len() - self.max_errors;
            self.entries.drain(0..overflow);
        }
    }

    /// All entries, sorted severity desc, then kind rank, then newest iteration first.
    pub fn unique(&self) -> Vec<&ErrorEntry> {
        let mut out: Vec<&ErrorEntry> = self.entries.iter().collect();
        out.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| kind_rank(a.kind).cmp(&kind_rank(b.kind)))
                .then_with(|| b.iteration.cmp(&a.iteration))
        });
        out
    }

    pub fn of_kind(&self, kind: ErrorKind) -> Vec<&ErrorEntry> {
        self.unique().into_iter().filter(|e| e.kind == kind).collect()
    }

    /// Count of times a `(kind, message)` pair has been seen across every
    /// `add` call so far, independent of dedup-key collapsing — used by
    /// the engine's repeated-failures escalation trigger.
    pub fn occurrences(&self, kind: ErrorKind, message: &str) -> usize {
        self.recurrence.get(&(kind, message.to_string())).copied().unwrap_or(0)
    }

    /// Grouped-by-kind text with a one-line summary header per group.
    pub fn format(&self) -> String {
        if self.entries.is_empty() {
            return "no errors".to_string();
        }

        let mut groups: HashMap<ErrorKind, Vec<&ErrorEntry>> = HashMap::new();
        for e in self.unique() {
            groups.entry(e.kind).or_default().push(e);
        }

        let mut kinds: Vec<ErrorKind> = groups.keys().copied().collect();
        kinds.sort_by_key(|k| kind_rank(*k));

        let mut out = String::new();
        for kind in kinds {
            let entries = &groups[&kind];
            out.push_str(&format!("{:?} ({} issue(s)):\n", kind, entries.len()));
            for e in entries {
                let location = match (&e.path, e.line) {
                    (Some(p), Some(l)) => format!(" [{p}:{l}]"),
                    (Some(p), None) => format!(" [{p}]"),
                    _ => String::new(),
                };
                out.push_str(&format!(
                    "  - ({:?}) {}{} (iteration {})\n",
                    e.severity, e.message, location, e.iteration
                ));
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recurrence.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: ErrorKind, severity: Severity, message: &str, iteration: u32) -> ErrorEntry {
        ErrorEntry::new(kind, severity, message, iteration)
    }

    #[test]
    fn add_same_error_twice_is_idempotent() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![entry(ErrorKind::Build, Severity::Error, "boom", 1)]);
        agg.add(vec![entry(ErrorKind::Build, Severity::Error, "boom", 1)]);
        assert_eq!(agg.unique().len(), 1);
    }

    #[test]
    fn duplicate_with_higher_iteration_wins() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![entry(ErrorKind::Test, Severity::Error, "expected 3 got 2", 1)]);
        agg.add(vec![entry(ErrorKind::Test, Severity::Error, "expected 3 got 2", 3)]);
        let unique = agg.unique();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].iteration, 3);
    }

    #[test]
    fn trims_oldest_past_cap() {
        let mut agg = ErrorAggregator::new(2);
        agg.add(vec![
            entry(ErrorKind::Build, Severity::Error, "a", 1),
            entry(ErrorKind::Build, Severity::Error, "b", 2),
            entry(ErrorKind::Build, Severity::Error, "c", 3),
        ]);
        assert_eq!(agg.len(), 2);
        assert!(agg.unique().iter().all(|e| e.message != "a"));
    }

    #[test]
    fn unique_orders_by_severity_then_kind_then_newest() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![
            entry(ErrorKind::Lint, Severity::Warning, "w", 1),
            entry(ErrorKind::Build, Severity::Error, "e1", 2),
            entry(ErrorKind::Test, Severity::Error, "e2", 3),
        ]);
        let unique = agg.unique();
        assert_eq!(unique[0].kind, ErrorKind::Build);
        assert_eq!(unique[1].kind, ErrorKind::Test);
        assert_eq!(unique[2].kind, ErrorKind::Lint);
    }

    #[test]
    fn of_kind_filters() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![
            entry(ErrorKind::Build, Severity::Error, "e1", 1),
            entry(ErrorKind::Test, Severity::Error, "e2", 1),
        ]);
        assert_eq!(agg.of_kind(ErrorKind::Build).len(), 1);
    }

    #[test]
    fn format_groups_by_kind_with_header() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![entry(ErrorKind::Build, Severity::Error, "boom", 1)]);
        let text = agg.format();
        assert!(text.contains("Build"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn format_empty_is_no_errors() {
        let agg = ErrorAggregator::default();
        assert_eq!(agg.format(), "no errors");
    }

    #[test]
    fn occurrences_counts_repeats_across_iterations() {
        let mut agg = ErrorAggregator::new(1000);
        agg.add(vec![entry(ErrorKind::Test, Severity::Error, "null deref at X:42", 1)]);
        agg.add(vec![entry(ErrorKind::Test, Severity::Error, "null deref at X:42", 2).with_location("x.rs", 1)]);
        agg.add(vec![entry(ErrorKind::Test, Severity::Error, "null deref at X:42", 3).with_location("x.rs", 2)]);
        assert_eq!(agg.occurrences(ErrorKind::Test, "null deref at X:42"), 3);
    }

    #[test]
    fn clear_empties_aggregator() {
        let mut agg = ErrorAggregator::default();
        agg.add(vec![entry(ErrorKind::Build, Severity::Error, "boom", 1)]);
        agg.clear();
        assert!(agg.is_empty());
    }
}
