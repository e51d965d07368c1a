//! Plain string values and counters (SET/GET/DEL/APPEND/INCRBY family).

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Why a counter update was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    /// Stored value does not parse as an i64
    NotAnInteger,
    /// Result would not fit in an i64
    Overflow,
}

/// String store. One RwLock over the whole map.
#[derive(Default)]
pub struct StringStore {
    values: RwLock<HashMap<String, String>>,
}

impl StringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Returns true if the key existed.
    pub fn delete(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    /// Append to the value (creating it if missing). Returns the new byte length.
    pub fn append(&self, key: &str, suffix: &str) -> usize {
        let mut values = self.values.write();
        let value = values.entry(key.to_string()).or_default();
        value.push_str(suffix);
        value.len()
    }

    /// Add `delta` to the integer at `key`. A missing key counts as 0.
    ///
    /// Read, check and write happen under one write lock.
    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CounterError> {
        let mut values = self.values.write();
        let current = match values.get(key) {
            Some(v) => v.parse::<i64>().map_err(|_| CounterError::NotAnInteger)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CounterError::Overflow)?;
        values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    /// Subtract `delta`. `i64::MIN` as a delta is an overflow, not a wrap.
    pub fn decr_by(&self, key: &str, delta: i64) -> Result<i64, CounterError> {
        let negated = delta.checked_neg().ok_or(CounterError::Overflow)?;
        self.incr_by(key, negated)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = StringStore::new();
        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".to_string()));
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_append_creates_and_extends() {
        let store = StringStore::new();
        assert_eq!(store.append("greeting", "hello"), 5);
        assert_eq!(store.append("greeting", " world"), 11);
        assert_eq!(store.get("greeting"), Some("hello world".to_string()));
    }

    #[test]
    fn test_counters() {
        let store = StringStore::new();
        assert_eq!(store.incr_by("c", 1), Ok(1));
        assert_eq!(store.incr_by("c", 10), Ok(11));
        assert_eq!(store.decr_by("c", 12), Ok(-1));
        assert_eq!(store.get("c"), Some("-1".to_string()));
    }

    #[test]
    fn test_counter_rejects_text() {
        let store = StringStore::new();
        store.set("name", "alice");
        assert_eq!(store.incr_by("name", 1), Err(CounterError::NotAnInteger));
        assert_eq!(store.get("name"), Some("alice".to_string()));
    }

    #[test]
    fn test_counter_overflow_leaves_value() {
        let store = StringStore::new();
        store.set("big", &i64::MAX.to_string());
        assert_eq!(store.incr_by("big", 1), Err(CounterError::Overflow));
        assert_eq!(store.get("big"), Some(i64::MAX.to_string()));
        assert_eq!(store.decr_by("x", i64::MIN), Err(CounterError::Overflow));
    }
}
