//! Swap payload preparation
//!
//! Chuẩn bị payload giao dịch mua/bán cho signer bên ngoài. Module này không ký và
//! không gửi giao dịch: chỉ đóng gói payload, xin ước tính phí và tính lượng nhận
//! tối thiểu theo slippage.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::chain_adapters::OnChainReader;
use crate::errors::{Result, SniperError};

/// Expected share received after DEX fees and price impact
const BUY_RECEIVE_RATIO: f64 = 0.97;
const SELL_RECEIVE_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwapAction {
    Buy,
    Sell,
}

impl SwapAction {
    fn receive_ratio(self) -> f64 {
        match self {
            SwapAction::Buy => BUY_RECEIVE_RATIO,
            SwapAction::Sell => SELL_RECEIVE_RATIO,
        }
    }
}

/// Prepared, unsigned swap for an external signer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub action: SwapAction,
    /// base64 payload
    pub tx_boc: String,
    pub estimated_receive: f64,
    pub min_receive: f64,
    pub fee_nano: u64,
    pub referral_payload: Option<String>,
}

pub struct SwapService {
    reader: Arc<dyn OnChainReader>,
    referral_payload: Option<String>,
}

impl SwapService {
    pub fn new(reader: Arc<dyn OnChainReader>, referral_payload: Option<String>) -> Self {
        Self {
            reader,
            referral_payload,
        }
    }

    pub async fn prepare_buy(&self, wallet: &str, jetton: &str, amount: f64, slippage: f64) -> Result<SwapQuote> {
        self.prepare(SwapAction::Buy, wallet, jetton, amount, slippage).await
    }

    pub async fn prepare_sell(&self, wallet: &str, jetton: &str, amount: f64, slippage: f64) -> Result<SwapQuote> {
        self.prepare(SwapAction::Sell, wallet, jetton, amount, slippage).await
    }

    async fn prepare(
        &self,
        action: SwapAction,
        wallet: &str,
        jetton: &str,
        amount: f64,
        slippage: f64,
    ) -> Result<SwapQuote> {
        if wallet.trim().is_empty() || jetton.trim().is_empty() {
            return Err(SniperError::ValidationError("wallet and jetton are required".to_string()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(SniperError::ValidationError(format!("amount must be positive, got {}", amount)));
        }
        if !(0.0..100.0).contains(&slippage) {
            return Err(SniperError::ValidationError(format!(
                "slippage must be in [0, 100), got {}",
                slippage
            )));
        }

        let payload = json!({
            "action": action,
            "wallet": wallet.trim(),
            "jetton": jetton.trim(),
            "amount": amount,
            "slippage": slippage,
            "referral_payload": self.referral_payload,
        });
        let tx_boc = STANDARD.encode(payload.to_string());

        let fee = self.reader.estimate_fee(&tx_boc).await?;
        let fee_nano = fee_from_estimate(&fee);

        let estimated_receive = amount * action.receive_ratio();
        let min_receive = estimated_receive * (1.0 - slippage / 100.0);

        info!(
            "Prepared {:?} of {} for {}: est {:.4}, min {:.4}, fee {} nano",
            action, jetton, wallet, estimated_receive, min_receive, fee_nano
        );

        Ok(SwapQuote {
            action,
            tx_boc,
            estimated_receive,
            min_receive,
            fee_nano,
            referral_payload: self.referral_payload.clone(),
        })
    }
}

/// `source_fees.fee` of an estimateFee result, number or string; 0 if absent
fn fee_from_estimate(fee: &Value) -> u64 {
    match fee.get("source_fees").and_then(|f| f.get("fee")) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_adapters::ton_adapter::MockOnChainReader;

    fn reader_with_fee(fee: Value) -> Arc<dyn OnChainReader> {
        let mut reader = MockOnChainReader::new();
        reader.expect_estimate_fee().returning(move |_| Ok(fee.clone()));
        Arc::new(reader)
    }

    #[tokio::test]
    async fn test_prepare_buy() {
        let service = SwapService::new(
            reader_with_fee(json!({"source_fees": {"fee": 12_345}})),
            Some("ref-1".to_string()),
        );

        let quote = service.prepare_buy("EQwallet", "EQjetton", 10.0, 5.0).await.unwrap();
        assert_eq!(quote.action, SwapAction::Buy);
        assert_eq!(quote.fee_nano, 12_345);
        assert!((quote.estimated_receive - 9.7).abs() < 1e-9);
        assert!((quote.min_receive - 9.215).abs() < 1e-9);

        let decoded: Value = serde_json::from_slice(&STANDARD.decode(&quote.tx_boc).unwrap()).unwrap();
        assert_eq!(decoded["action"], "BUY");
        assert_eq!(decoded["jetton"], "EQjetton");
        assert_eq!(decoded["referral_payload"], "ref-1");
    }

    #[tokio::test]
    async fn test_prepare_sell_uses_sell_ratio() {
        let service = SwapService::new(reader_with_fee(json!({"source_fees": {"fee": "99"}})), None);
        let quote = service.prepare_sell("EQwallet", "EQjetton", 100.0, 0.0).await.unwrap();
        assert_eq!(quote.fee_nano, 99);
        assert!((quote.estimated_receive - 95.0).abs() < 1e-9);
        assert_eq!(quote.min_receive, quote.estimated_receive);
    }

    #[tokio::test]
    async fn test_invalid_arguments_and_fee_failure() {
        let service = SwapService::new(reader_with_fee(json!({})), None);
        assert!(service.prepare_buy("EQw", "EQj", 0.0, 1.0).await.unwrap_err().is_validation_error());
        assert!(service.prepare_buy("EQw", "EQj", 1.0, 100.0).await.is_err());

        let mut reader = MockOnChainReader::new();
        reader
            .expect_estimate_fee()
            .returning(|_| Err(SniperError::UpstreamUnavailable("rpc down".into())));
        let service = SwapService::new(Arc::new(reader), None);
        assert!(service.prepare_sell("EQw", "EQj", 1.0, 1.0).await.unwrap_err().is_upstream());
    }
}
