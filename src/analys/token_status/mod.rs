//! Module token_status
//!
//! Module này chứa các sub-check dùng khi chấm điểm một jetton mới:
//! - Xác định owner/admin và trạng thái LP burned
//! - Đối chiếu owner với blacklist
//! - Ước lượng thanh khoản và volume 5 phút
//! - Đếm ví smart money tham gia
//! - Công thức chấm điểm thuần (không I/O)
//!
//! Sub-checks read two inputs: the contract data returned by `getJettonData`
//! and the raw attributes of the source frame.

use serde_json::Value;

// Owner, renounce, LP burned
mod owner;

// Blacklist owner
mod blacklist;

// Thanh khoản, volume
mod liquidity;

// Smart money
mod smart_money;

// Công thức điểm
mod scoring;

pub use blacklist::Blacklist;
pub use liquidity::{estimate_liquidity_usd, estimate_volume_5m_usd};
pub use owner::{is_lp_burned, resolve_owner};
pub use scoring::{score_token, ScoreInputs, ScoreThresholds, BASELINE_SCORE, SAFE_SCORE_FLOOR};
pub use smart_money::count_smart_money;

/// Look up a raw attribute: top level first, then inside `payload`
pub fn raw_field<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key)
        .filter(|v| !v.is_null())
        .or_else(|| raw.get("payload").and_then(|p| p.get(key)).filter(|v| !v.is_null()))
}

/// Number or numeric string as f64
pub(crate) fn as_usd(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_field_prefers_top_level() {
        let raw = json!({"owner": "EQtop", "payload": {"owner": "EQinner", "symbol": "FOO"}});
        assert_eq!(raw_field(&raw, "owner"), Some(&json!("EQtop")));
        assert_eq!(raw_field(&raw, "symbol"), Some(&json!("FOO")));
        assert_eq!(raw_field(&raw, "missing"), None);
        assert_eq!(as_usd(&json!("1500.5")), Some(1500.5));
    }
}
