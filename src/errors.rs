//! # Error handling cho HyperSniper
//!
//! Enum lỗi tập trung cho toàn bộ pipeline: feed, RPC, chấm điểm, thông báo và
//! rule engine. Các trait ở ranh giới (OnChainReader, FeedTransport, MessageSender,
//! RuleStore...) đều trả về `Result<T>` của module này; tầng ứng dụng (AppState,
//! ConfigManager, main) dùng `anyhow`.
//!
//! ```rust
//! use hypersniper::errors::{Result, SniperError};
//!
//! fn check_slippage(slippage: f64) -> Result<()> {
//!     if !(0.0..100.0).contains(&slippage) {
//!         return Err(SniperError::ValidationError("slippage out of range".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Kết quả chung cho toàn bộ crate
pub type Result<T> = std::result::Result<T, SniperError>;

#[derive(Debug, Error)]
pub enum SniperError {
    /// Mất kết nối feed hoặc RPC (kể cả lỗi decode/protocol trên stream)
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Endpoint đọc on-chain không truy cập được
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Phía remote báo lỗi ứng dụng
    #[error("Upstream error {code}: {message}")]
    UpstreamError { code: i64, message: String },

    /// Hết ngân sách thời gian khi chấm điểm
    #[error("Evaluation of {address} exceeded {budget_ms} ms")]
    EvaluationTimeout { address: String, budget_ms: u64 },

    /// Gửi thông báo/webhook thất bại
    #[error("Delivery failure to {recipient}: {reason}")]
    DeliveryFailure { recipient: String, reason: String },

    /// Tham số đầu vào không hợp lệ
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Lỗi kho lưu trữ bên ngoài
    #[error("Store error: {0}")]
    StoreError(String),

    /// Lỗi cache
    #[error("Cache error: {0}")]
    CacheError(String),
}

impl SniperError {
    pub fn delivery(recipient: impl ToString, reason: impl ToString) -> Self {
        SniperError::DeliveryFailure {
            recipient: recipient.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Lỗi này có thể retry không
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SniperError::TransportFailure(_)
                | SniperError::UpstreamUnavailable(_)
                | SniperError::DeliveryFailure { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SniperError::EvaluationTimeout { .. })
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, SniperError::ValidationError(_))
    }

    /// Lỗi phía upstream (không truy cập được hoặc báo lỗi)
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SniperError::UpstreamUnavailable(_) | SniperError::UpstreamError { .. }
        )
    }
}

impl From<serde_json::Error> for SniperError {
    fn from(err: serde_json::Error) -> Self {
        SniperError::TransportFailure(format!("json: {}", err))
    }
}

impl From<redis::RedisError> for SniperError {
    fn from(err: redis::RedisError) -> Self {
        SniperError::StoreError(err.to_string())
    }
}

impl From<reqwest::Error> for SniperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SniperError::UpstreamUnavailable(err.to_string())
        } else {
            SniperError::TransportFailure(err.to_string())
        }
    }
}
