//! Phân tích owner/admin của jetton minter và trạng thái LP

use serde_json::Value;

use super::raw_field;

/// Admin address from contract data, falling back to the event's `owner`.
///
/// An empty string or the TON zero address counts as no owner.
pub fn resolve_owner(contract: &Value, raw: &Value) -> Option<String> {
    contract
        .get("admin_address")
        .and_then(Value::as_str)
        .or_else(|| raw_field(raw, "owner").and_then(Value::as_str))
        .map(str::trim)
        .filter(|owner| !owner.is_empty() && !is_zero_address(owner))
        .map(str::to_string)
}

/// LP counts as burned when the contract says so, the event flags it, or
/// the minter has no owner left.
pub fn is_lp_burned(contract: &Value, raw: &Value, owner: Option<&str>) -> bool {
    if contract.get("lp_status").and_then(Value::as_str) == Some("burned") {
        return true;
    }
    if raw_field(raw, "lp_burned").and_then(Value::as_bool).unwrap_or(false) {
        return true;
    }
    owner.is_none()
}

fn is_zero_address(address: &str) -> bool {
    match address.split_once(':') {
        Some((_, hex)) => hex.chars().all(|c| c == '0'),
        None => false,
    }
}
