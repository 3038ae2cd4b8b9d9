//! Utility modules.

pub mod retry;

pub use retry::{RetryOutcome, RetryPolicy, Retryable, with_retry};
