//! List values (LPUSH/RPUSH/LPOP/RPOP/LRANGE).

use std::collections::VecDeque;

use hashbrown::HashMap;
use parking_lot::RwLock;

/// List store. A list that becomes empty is removed.
#[derive(Default)]
pub struct ListStore {
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

impl ListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push each value onto the head, in argument order: `[a, b]` ends up as `b, a, ...`.
    /// Returns the new length.
    pub fn push_front(&self, key: &str, values: &[String]) -> usize {
        let mut lists = self.lists.write();
        let list = lists.entry(key.to_string()).or_default();
        for v in values {
            list.push_front(v.clone());
        }
        list.len()
    }

    /// Push values onto the tail. Returns the new length.
    pub fn push_back(&self, key: &str, values: &[String]) -> usize {
        let mut lists = self.lists.write();
        let list = lists.entry(key.to_string()).or_default();
        list.extend(values.iter().cloned());
        list.len()
    }

    pub fn pop_front(&self, key: &str) -> Option<String> {
        self.pop_with(key, VecDeque::pop_front)
    }

    pub fn pop_back(&self, key: &str) -> Option<String> {
        self.pop_with(key, VecDeque::pop_back)
    }

    fn pop_with(&self, key: &str, pop: fn(&mut VecDeque<String>) -> Option<String>) -> Option<String> {
        let mut lists = self.lists.write();
        let list = lists.get_mut(key)?;
        let value = pop(list);
        if list.is_empty() {
            lists.remove(key);
        }
        value
    }

    /// Elements `start..=end`.
    ///
    /// A negative `start` clamps to 0; a negative or past-the-end `end`
    /// clamps to the last element. None if the key is missing or the range
    /// is empty.
    pub fn range(&self, key: &str, start: i64, end: i64) -> Option<Vec<String>> {
        let lists = self.lists.read();
        let list = lists.get(key)?;

        let last = list.len() as i64 - 1;
        let start = start.max(0);
        let end = if end < 0 || end > last { last } else { end };
        if start > end {
            return None;
        }

        Some(
            list.range(start as usize..=end as usize)
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self, key: &str) -> usize {
        self.lists.read().get(key).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_push_front_order() {
        let store = ListStore::new();
        assert_eq!(store.push_front("l", &strings(&["value1"])), 1);
        assert_eq!(store.push_front("l", &strings(&["value2", "value3"])), 3);
        assert_eq!(store.range("l", 0, -1), Some(strings(&["value3", "value2", "value1"])));
    }

    #[test]
    fn test_push_back_order() {
        let store = ListStore::new();
        store.push_back("l", &strings(&["a", "b"]));
        store.push_back("l", &strings(&["c"]));
        assert_eq!(store.range("l", 0, 10), Some(strings(&["a", "b", "c"])));
    }

    #[test]
    fn test_pop_both_ends_and_cleanup() {
        let store = ListStore::new();
        store.push_back("l", &strings(&["a", "b", "c"]));
        assert_eq!(store.pop_front("l"), Some("a".to_string()));
        assert_eq!(store.pop_back("l"), Some("c".to_string()));
        assert_eq!(store.pop_back("l"), Some("b".to_string()));
        assert_eq!(store.pop_back("l"), None);
        assert_eq!(store.len("l"), 0);
        assert_eq!(store.range("l", 0, -1), None);
    }

    #[test]
    fn test_pop_missing() {
        let store = ListStore::new();
        assert_eq!(store.pop_front("nothing"), None);
    }

    #[test]
    fn test_range_clamping() {
        let store = ListStore::new();
        store.push_back("l", &strings(&["a", "b", "c", "d"]));
        assert_eq!(store.range("l", -5, 1), Some(strings(&["a", "b"])));
        assert_eq!(store.range("l", 2, 99), Some(strings(&["c", "d"])));
        assert_eq!(store.range("l", 3, 1), None);
        assert_eq!(store.range("l", 7, -1), None);
    }
}
