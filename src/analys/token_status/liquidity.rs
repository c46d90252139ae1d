//! Ước lượng thanh khoản và volume 5 phút

use serde_json::Value;

use super::{as_usd, raw_field};

/// Liquidity in USD: contract data, then event attributes, then pool stats; 0 otherwise
pub fn estimate_liquidity_usd(contract: &Value, raw: &Value) -> f64 {
    contract
        .get("liquidity_usd")
        .and_then(as_usd)
        .or_else(|| raw_field(raw, "liquidity_usd").and_then(as_usd))
        .or_else(|| {
            raw_field(raw, "pool_stats")
                .and_then(|stats| stats.get("liquidity_usd"))
                .and_then(as_usd)
        })
        .map(|v| v.max(0.0))
        .unwrap_or(0.0)
}

/// 5 minute volume in USD; 0 when the source does not report it
pub fn estimate_volume_5m_usd(raw: &Value) -> f64 {
    raw_field(raw, "volume_5m_usd")
        .and_then(as_usd)
        .or_else(|| raw_field(raw, "volume_usd").and_then(as_usd))
        .map(|v| v.max(0.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_liquidity_fallbacks() {
        let raw = json!({"liquidity_usd": 1200.0, "pool_stats": {"liquidity_usd": 900.0}});
        assert_eq!(estimate_liquidity_usd(&json!({"liquidity_usd": 8000}), &raw), 8000.0);
        assert_eq!(estimate_liquidity_usd(&json!({}), &raw), 1200.0);
        assert_eq!(
            estimate_liquidity_usd(&json!({}), &json!({"pool_stats": {"liquidity_usd": "900"}})),
            900.0
        );
        assert_eq!(estimate_liquidity_usd(&json!({}), &json!({})), 0.0);
    }

    #[test]
    fn test_volume_fallbacks() {
        assert_eq!(estimate_volume_5m_usd(&json!({"payload": {"volume_5m_usd": 25000}})), 25000.0);
        assert_eq!(estimate_volume_5m_usd(&json!({"volume_usd": 300})), 300.0);
        assert_eq!(estimate_volume_5m_usd(&json!({})), 0.0);
    }
}
