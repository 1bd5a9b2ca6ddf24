//! Scoped cache for in-progress form fields.
//!
//! Drafts are keyed by the id of the entity the form edits. There is no
//! expiry: the host clears an owner's draft on cancel or on success.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Draft form values grouped by owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "V: Serialize", deserialize = "V: Deserialize<'de>"))]
pub struct FormCache<V> {
    drafts: HashMap<String, HashMap<String, V>>,
}

impl<V> Default for FormCache<V> {
    fn default() -> Self {
        Self {
            drafts: HashMap::new(),
        }
    }
}

impl<V> FormCache<V> {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value of one field.
    #[must_use]
    pub fn get(&self, owner: &str, field: &str) -> Option<&V> {
        self.drafts.get(owner)?.get(field)
    }

    /// All cached fields of an owner.
    #[must_use]
    pub fn draft(&self, owner: &str) -> Option<&HashMap<String, V>> {
        self.drafts.get(owner)
    }

    /// Cache a field value, returning the previous one.
    pub fn put(&mut self, owner: &str, field: &str, value: V) -> Option<V> {
        self.drafts
            .entry(owner.to_string())
            .or_default()
            .insert(field.to_string(), value)
    }

    /// Forget one field.
    pub fn remove_field(&mut self, owner: &str, field: &str) -> Option<V> {
        let draft = self.drafts.get_mut(owner)?;
        let removed = draft.remove(field);
        if draft.is_empty() {
            self.drafts.remove(owner);
        }
        removed
    }

    /// Drop an owner's whole draft.
    pub fn clear(&mut self, owner: &str) -> Option<HashMap<String, V>> {
        self.drafts.remove(owner)
    }

    /// Whether any draft is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_drafts_are_scoped_by_owner() {
        let mut cache: FormCache<Value> = FormCache::new();
        cache.put("product-1", "name", json!("Curso"));
        cache.put("product-2", "name", json!("Ebook"));

        assert_eq!(cache.get("product-1", "name"), Some(&json!("Curso")));
        assert_eq!(cache.get("product-2", "name"), Some(&json!("Ebook")));
        assert_eq!(cache.get("product-3", "name"), None);
    }

    #[test]
    fn test_clear_on_cancel() {
        let mut cache: FormCache<String> = FormCache::new();
        cache.put("offer-1", "price", "97.00".to_string());
        cache.put("offer-1", "title", "Oferta".to_string());

        let draft = cache.clear("offer-1").expect("draft existed");
        assert_eq!(draft.len(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_last_field_drops_owner() {
        let mut cache: FormCache<i64> = FormCache::new();
        assert_eq!(cache.put("o", "qty", 1), None);
        assert_eq!(cache.put("o", "qty", 2), Some(1));
        assert_eq!(cache.remove_field("o", "qty"), Some(2));
        assert!(cache.draft("o").is_none());
    }

    #[test]
    fn test_serializable_draft() {
        let mut cache: FormCache<String> = FormCache::new();
        cache.put("o", "coupon", "BEMVINDO".to_string());
        let json = serde_json::to_string(&cache).expect("serialize");
        let back: FormCache<String> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cache);
    }
}
