//! Công thức chấm điểm an toàn
//!
//! Hàm thuần: nhận kết quả các sub-check, trả về `SafetyReport`. Không I/O, không
//! đồng hồ, nên có thể test trực tiếp.

use common::SafetyReport;

/// Điểm khởi đầu
pub const BASELINE_SCORE: f64 = 60.0;

/// `is_safe` requires at least this score
pub const SAFE_SCORE_FLOOR: f64 = 70.0;

const HONEYPOT_PENALTY: f64 = 40.0;
const NO_OWNER_BONUS: f64 = 8.0;
const LOW_LIQUIDITY_PENALTY: f64 = 10.0;
const LIQUIDITY_BONUS_CAP: f64 = 10.0;
const LOW_VOLUME_PENALTY: f64 = 5.0;
const VOLUME_BONUS_CAP: f64 = 15.0;
const SMART_MONEY_BONUS: f64 = 4.0;
const LP_BURNED_BONUS: f64 = 5.0;
const NEW_TOKEN_BONUS: f64 = 3.0;

/// Outcome of the sub-checks for one address
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub honeypot_passed: bool,
    pub owner: Option<String>,
    pub owner_blacklisted: bool,
    pub liquidity_usd: f64,
    pub volume_5m_usd: f64,
    pub smart_money_hits: u32,
    pub lp_burned: bool,
    pub is_new: bool,
}

/// Configured minimums for the liquidity and volume terms
#[derive(Debug, Clone, Copy)]
pub struct ScoreThresholds {
    pub min_liquidity_usd: f64,
    pub min_volume_5m_usd: f64,
}

/// Apply the scoring formula. Reasons are recorded in the order they apply.
pub fn score_token(inputs: &ScoreInputs, thresholds: ScoreThresholds) -> SafetyReport {
    let mut score = BASELINE_SCORE;
    let mut reasons = Vec::new();

    if !inputs.honeypot_passed {
        score -= HONEYPOT_PENALTY;
        reasons.push("honeypot simulation failed".to_string());
    }

    let report = |score: f64, reasons: Vec<String>| SafetyReport {
        is_safe: score >= SAFE_SCORE_FLOOR && inputs.honeypot_passed,
        score,
        reasons,
        liquidity_usd: inputs.liquidity_usd,
        volume_5m_usd: inputs.volume_5m_usd,
        smart_money_hits: inputs.smart_money_hits,
        lp_burned: inputs.lp_burned,
        is_new: inputs.is_new,
        owner: inputs.owner.clone(),
    };

    if inputs.owner_blacklisted {
        reasons.push("owner is blacklisted".to_string());
        return report(0.0, reasons);
    }

    if inputs.owner.is_none() {
        score += NO_OWNER_BONUS;
        reasons.push("no owner (renounced)".to_string());
    }

    if inputs.liquidity_usd < thresholds.min_liquidity_usd {
        score -= LOW_LIQUIDITY_PENALTY;
        reasons.push("low liquidity".to_string());
    } else {
        score += (inputs.liquidity_usd / 1_000.0).min(LIQUIDITY_BONUS_CAP);
        reasons.push(format!("liquidity ${:.0}", inputs.liquidity_usd));
    }

    if inputs.volume_5m_usd < thresholds.min_volume_5m_usd {
        score -= LOW_VOLUME_PENALTY;
        reasons.push("low 5m volume".to_string());
    } else {
        score += (inputs.volume_5m_usd / 2_000.0).min(VOLUME_BONUS_CAP);
        reasons.push(format!("5m volume ${:.0}", inputs.volume_5m_usd));
    }

    if inputs.smart_money_hits > 0 {
        score += SMART_MONEY_BONUS * f64::from(inputs.smart_money_hits);
        reasons.push(format!("{} smart money wallet(s)", inputs.smart_money_hits));
    }

    if inputs.lp_burned {
        score += LP_BURNED_BONUS;
        reasons.push("LP burned".to_string());
    }

    if inputs.is_new {
        score += NEW_TOKEN_BONUS;
        reasons.push("new token".to_string());
    }

    report(score.clamp(0.0, 100.0), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: ScoreThresholds = ScoreThresholds {
        min_liquidity_usd: 5_000.0,
        min_volume_5m_usd: 20_000.0,
    };

    fn strong() -> ScoreInputs {
        ScoreInputs {
            honeypot_passed: true,
            owner: None,
            owner_blacklisted: false,
            liquidity_usd: 50_000.0,
            volume_5m_usd: 100_000.0,
            smart_money_hits: 10,
            lp_burned: true,
            is_new: true,
        }
    }

    #[test]
    fn test_score_is_clamped() {
        let report = score_token(&strong(), THRESHOLDS);
        assert_eq!(report.score, 100.0);
        assert!(report.is_safe);
        assert_eq!(report.reasons.first().map(String::as_str), Some("no owner (renounced)"));
    }

    #[test]
    fn test_blacklisted_owner_scores_zero() {
        let inputs = ScoreInputs {
            owner: Some("EQscam".to_string()),
            owner_blacklisted: true,
            ..strong()
        };
        let report = score_token(&inputs, THRESHOLDS);
        assert_eq!(report.score, 0.0);
        assert!(!report.is_safe);
        assert_eq!(report.reasons, vec!["owner is blacklisted".to_string()]);
    }

    #[test]
    fn test_weak_token_with_failed_honeypot() {
        let inputs = ScoreInputs {
            honeypot_passed: false,
            owner: Some("EQdev".to_string()),
            ..ScoreInputs::default()
        };
        // 60 - 40 - 10 - 5
        let report = score_token(&inputs, THRESHOLDS);
        assert_eq!(report.score, 5.0);
        assert!(!report.is_safe);
        assert_eq!(
            report.reasons,
            vec!["honeypot simulation failed", "low liquidity", "low 5m volume"]
        );
    }

    #[test]
    fn test_honeypot_failure_is_never_safe() {
        let inputs = ScoreInputs {
            honeypot_passed: false,
            ..strong()
        };
        let report = score_token(&inputs, THRESHOLDS);
        assert!(report.score >= SAFE_SCORE_FLOOR);
        assert!(!report.is_safe);
    }
}
