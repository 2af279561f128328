//! Resilience primitives shared by the export pipeline
//!
//! - [`rate_limiter`] - Token bucket bounding calls to the document service
//! - [`circuit_breaker`] - Per-dependency failure isolation
//! - [`error_handler`] - Error classification, recovery decisions, and history

pub mod circuit_breaker;
pub mod error_handler;
pub mod rate_limiter;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats,
    CircuitState,
};
pub use error_handler::{
    CategorizedError, ErrorCategory, ErrorContext, ErrorHandler, ErrorReport, ErrorSeverity,
    ErrorStatistics, FallbackData, RecoveryDecision, RecoveryStrategy,
};
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterStatus};
