use std::collections::BTreeMap;

use serde_json::Value;

/// Only the first elements of each array are expanded; large arrays
/// (price histories, search result lists) would otherwise dominate the
/// fact set.
pub const MAX_SEQUENCE_ELEMENTS: usize = 20;

/// Flatten a JSON tree into `dotted.path -> scalar leaf`.
///
/// Object keys and array indices become path segments. `null` leaves are
/// kept; callers decide whether they count as facts. A bare scalar
/// flattens to the empty path.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, format!("{prefix}{key}."), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().take(MAX_SEQUENCE_ELEMENTS).enumerate() {
                flatten_into(child, format!("{prefix}{index}."), out);
            }
        }
        scalar => {
            let key = prefix.strip_suffix('.').unwrap_or(&prefix).to_string();
            out.insert(key, scalar.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{MAX_SEQUENCE_ELEMENTS, flatten};

    #[test]
    fn nested_objects_become_dotted_paths() {
        let flat = flatten(&json!({
            "price": 105.5,
            "financials": {"totalRevenue": 1_800_000_000u64, "currency": "USD"},
            "listed": true,
            "delisted_at": null
        }));

        assert_eq!(flat.len(), 5);
        assert_eq!(flat["price"], json!(105.5));
        assert_eq!(flat["financials.totalRevenue"], json!(1_800_000_000u64));
        assert_eq!(flat["financials.currency"], json!("USD"));
        assert_eq!(flat["listed"], json!(true));
        assert_eq!(flat["delisted_at"], Value::Null);
    }

    #[test]
    fn arrays_are_indexed_and_capped() {
        let history: Vec<Value> = (0..30).map(|i| json!({"close": i})).collect();
        let flat = flatten(&json!({"history": history, "tags": ["a", "b"]}));

        assert_eq!(flat["tags.0"], json!("a"));
        assert_eq!(flat["tags.1"], json!("b"));
        assert_eq!(flat["history.19.close"], json!(19));
        assert!(!flat.contains_key("history.20.close"));
        assert_eq!(
            flat.keys().filter(|k| k.starts_with("history.")).count(),
            MAX_SEQUENCE_ELEMENTS
        );
    }

    #[test]
    fn empty_containers_produce_no_leaves() {
        assert!(flatten(&json!({"a": {}, "b": []})).is_empty());
    }

    #[test]
    fn bare_scalar_flattens_to_empty_path() {
        let flat = flatten(&json!(42));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[""], json!(42));
    }

    #[test]
    fn every_scalar_leaf_appears_exactly_once() {
        let tree = json!({
            "a": [1, [2, 3], {"b": 4}],
            "c": {"d": {"e": "x"}, "f": false}
        });
        let flat = flatten(&tree);

        let mut keys: Vec<&String> = flat.keys().collect();
        keys.dedup();
        assert_eq!(keys.len(), 6);
        for (path, leaf) in &flat {
            let pointer = format!("/{}", path.replace('.', "/"));
            assert_eq!(tree.pointer(&pointer), Some(leaf));
        }
    }
}
