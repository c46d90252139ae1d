//! Đếm ví smart money trong danh sách holder/buyer quan sát được

use std::collections::HashSet;

use serde_json::Value;

use super::raw_field;

/// Number of distinct trusted addresses among the observed holders and buyers.
///
/// Entries may be plain strings or objects with an `address` field.
pub fn count_smart_money(raw: &Value, trusted: &HashSet<String>) -> u32 {
    if trusted.is_empty() {
        return 0;
    }

    let observed: HashSet<&str> = ["holders", "buyers"]
        .iter()
        .filter_map(|key| raw_field(raw, key).and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| match entry {
            Value::String(address) => Some(address.as_str()),
            Value::Object(map) => map.get("address").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .collect();

    observed.iter().filter(|a| trusted.contains(**a)).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_union_once() {
        let trusted: HashSet<String> = ["EQwhale", "EQfund"].iter().map(|s| s.to_string()).collect();
        let raw = json!({
            "holders": ["EQwhale", "EQrandom"],
            "buyers": [{"address": "EQwhale"}, {"address": "EQfund"}, 42]
        });
        assert_eq!(count_smart_money(&raw, &trusted), 2);
        assert_eq!(count_smart_money(&json!({}), &trusted), 0);
    }
}
