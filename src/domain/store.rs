//! Minimal persistence abstraction for domain records.
//!
//! Replaces the external taskstore crate with an in-crate, in-memory
//! reference implementation. Collaborators that need durable storage
//! (a real database, a remote store) implement `Record`/`Store` the
//! same way and swap in for `MemoryStore`.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since epoch, used for all domain timestamps.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// A value that can be indexed and filtered on without deserializing
/// the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    String(String),
    Bool(bool),
    Number(i64),
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{s}"),
            IndexValue::Bool(b) => write!(f, "{b}"),
            IndexValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Comparison applied by a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single indexed-field filter used by `Store::list`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    fn matches(&self, indexed: &HashMap<String, IndexValue>) -> bool {
        let Some(actual) = indexed.get(&self.field) else {
            return false;
        };
        match (&self.op, actual, &self.value) {
            (FilterOp::Eq, a, b) => a == b,
            (FilterOp::Ne, a, b) => a != b,
            (FilterOp::Lt, IndexValue::Number(a), IndexValue::Number(b)) => a < b,
            (FilterOp::Lte, IndexValue::Number(a), IndexValue::Number(b)) => a <= b,
            (FilterOp::Gt, IndexValue::Number(a), IndexValue::Number(b)) => a > b,
            (FilterOp::Gte, IndexValue::Number(a), IndexValue::Number(b)) => a >= b,
            _ => false,
        }
    }
}

/// Anything persisted through a `Store` implements this.
pub trait Record: Send + Sync {
    fn id(&self) -> &str;
    fn updated_at(&self) -> i64;
    fn collection_name() -> &'static str
    where
        Self: Sized;
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// In-memory reference store keyed by record id, grouped by collection.
///
/// Not durable across process restarts; a collaborator wanting
/// durability swaps this for a real database behind the same
/// `Store<T>` surface used by callers in this crate.
pub struct MemoryStore<T> {
    records: HashMap<String, T>,
}

impl<T: Record + Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<T: Record + Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, record: T) {
        self.records.insert(record.id().to_string(), record);
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.records.get_mut(id)
    }

    pub fn delete(&mut self, id: &str) -> Option<T> {
        self.records.remove(id)
    }

    pub fn list(&self, filters: &[Filter]) -> Vec<&T> {
        self.records
            .values()
            .filter(|r| filters.iter().all(|f| f.matches(&r.indexed_fields())))
            .collect()
    }

    pub fn all(&self) -> Vec<&T> {
        self.records.values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All ids mapped to a display label, for `IdResolver`.
    pub fn id_index(&self, label: impl Fn(&T) -> String) -> HashMap<String, String> {
        self.records
            .iter()
            .map(|(id, r)| (id.clone(), label(r)))
            .collect()
    }
}
