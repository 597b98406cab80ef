use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

/// A query result set the size cache can sample from.
///
/// Only one representative row is ever inspected: `sample_item` yields the
/// first element in iteration order (key order for map-like results) and
/// never walks the rest.
pub trait Dataset {
    type Item: Serialize + ?Sized;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sample_item(&self) -> Option<&Self::Item>;
}

impl<T: Serialize> Dataset for [T] {
    type Item = T;

    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn sample_item(&self) -> Option<&T> {
        self.iter().next()
    }
}

impl<T: Serialize> Dataset for Vec<T> {
    type Item = T;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn sample_item(&self) -> Option<&T> {
        self.iter().next()
    }
}

impl<T: Serialize> Dataset for VecDeque<T> {
    type Item = T;

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn sample_item(&self) -> Option<&T> {
        self.iter().next()
    }
}

impl<K: Ord, V: Serialize> Dataset for BTreeMap<K, V> {
    type Item = V;

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn sample_item(&self) -> Option<&V> {
        self.values().next()
    }
}

impl<K, V: Serialize, S> Dataset for HashMap<K, V, S> {
    type Item = V;

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn sample_item(&self) -> Option<&V> {
        self.values().next()
    }
}

impl Dataset for serde_json::Value {
    type Item = serde_json::Value;

    /// Arrays and objects report their element count; any other value is a
    /// single document, `null` is empty.
    fn len(&self) -> usize {
        match self {
            serde_json::Value::Null => 0,
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(map) => map.len(),
            _ => 1,
        }
    }

    fn sample_item(&self) -> Option<&serde_json::Value> {
        match self {
            serde_json::Value::Null => None,
            serde_json::Value::Array(items) => items.iter().next(),
            serde_json::Value::Object(map) => map.values().next(),
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn slices_yield_first_element() {
        let rows = vec![json!({"a": 1}), json!({"b": 2})];
        assert_eq!(rows.sample_item(), Some(&json!({"a": 1})));
        assert_eq!(Dataset::len(rows.as_slice()), 2);
    }

    #[test]
    fn maps_yield_first_in_key_order() {
        let mut by_id = BTreeMap::new();
        by_id.insert("zz", "last");
        by_id.insert("aa", "first");
        assert_eq!(by_id.sample_item(), Some(&"first"));
    }

    #[test]
    fn empty_collections_report_empty() {
        let rows: Vec<u32> = Vec::new();
        assert!(Dataset::is_empty(&rows));
        assert_eq!(rows.sample_item(), None);
        assert!(Dataset::is_empty(&json!(null)));
        assert!(Dataset::is_empty(&json!([])));
    }

    #[test]
    fn json_scalars_are_single_documents() {
        let v = json!("solo");
        assert_eq!(Dataset::len(&v), 1);
        assert_eq!(v.sample_item(), Some(&json!("solo")));
    }
}
