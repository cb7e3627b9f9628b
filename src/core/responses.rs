/// Collected learner responses for the active module, keyed by inflection
/// key. Created empty when a module becomes active and discarded with the
/// session — no persistence.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct ResponseStore {
    responses: FxHashMap<String, String>,
}

impl ResponseStore {
    pub fn new() -> ResponseStore {
        ResponseStore::default()
    }

    /// Store a response. The value is trimmed; an empty submission is a
    /// no-op. Resubmission overwrites the prior answer. Returns whether
    /// anything was stored.
    pub fn submit(&mut self, key: &str, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.responses.insert(key.to_string(), trimmed.to_string());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.responses.get(key).map(String::as_str)
    }

    /// A present key is what gates forward navigation on inflection cards.
    pub fn contains(&self, key: &str) -> bool {
        self.responses.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Read access for prompt building and presentation.
    pub fn map(&self) -> &FxHashMap<String, String> {
        &self.responses
    }

    pub fn clear(&mut self) {
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_trims_value() {
        let mut store = ResponseStore::new();
        assert!(store.submit("advice", "  let go of the ledger  "));
        assert_eq!(store.get("advice"), Some("let go of the ledger"));
    }

    #[test]
    fn empty_submission_is_noop() {
        let mut store = ResponseStore::new();
        assert!(!store.submit("advice", "   "));
        assert!(!store.contains("advice"));
        assert!(store.is_empty());
    }

    #[test]
    fn resubmission_overwrites() {
        let mut store = ResponseStore::new();
        store.submit("advice", "first");
        store.submit("advice", "second");
        assert_eq!(store.get("advice"), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = ResponseStore::new();
        store.submit("advice", "x");
        store.clear();
        assert!(store.is_empty());
    }
}
