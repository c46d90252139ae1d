//! Module analys
//!
//! Module này chịu trách nhiệm đánh giá độ an toàn của jetton mới:
//! - token_status: các sub-check (owner, blacklist, thanh khoản, smart money) và công thức điểm
//! - safety_checker: chạy các sub-check song song trong ngân sách thời gian, cache kết quả

pub mod safety_checker;
pub mod token_status;

pub use safety_checker::SafetyChecker;
