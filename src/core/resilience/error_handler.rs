//! Error classification and recovery decisions
//!
//! Raw failures are matched against ordered category rules (first match
//! wins), enriched with a severity and recovery strategy, and kept in a
//! bounded history that feeds statistics, reports, and the operation-wide
//! abort heuristic.

use crate::config::ErrorHandlingSettings;
use crate::domain::{sanitize_file_name, QuipError, ResolvedFormat};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Upper bound for any computed retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Window inspected by [`ErrorHandler::should_abort_operation`]
pub const ABORT_WINDOW: Duration = Duration::from_secs(5 * 60);

const ABORT_CRITICAL_THRESHOLD: usize = 3;
const ABORT_AUTH_THRESHOLD: usize = 5;
const ABORT_TOTAL_THRESHOLD: usize = 20;
const MAX_SOURCE_CHAIN: usize = 5;
const REPORT_RECENT_ERRORS: usize = 10;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Network,
    Server,
    Client,
    RateLimit,
    FileSystem,
    Memory,
    Timeout,
    Validation,
    Configuration,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::RateLimit => "api_rate_limit",
            ErrorCategory::FileSystem => "file_system",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// Recovery strategy assigned to a categorized error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Skip,
    Fallback,
    Abort,
    /// Needs an operator; treated as abort
    Manual,
}

/// Where an error happened
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorContext {
    /// Operation name, e.g. `document-export`
    pub operation: String,
    pub document_id: Option<String>,
    pub document_title: Option<String>,
    pub folder_path: Option<String>,
    /// Zero-based attempt number
    pub attempt_number: u32,
}

impl ErrorContext {
    /// Context for a named operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Attach the document being processed
    pub fn with_document(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self.document_title = Some(title.into());
        self
    }

    /// Attach the folder being processed
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder_path = Some(folder.into());
        self
    }

    /// Set the attempt number
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt_number = attempt;
        self
    }
}

/// Diagnostic detail kept alongside the user-facing message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalDetails {
    pub original_message: String,
    pub error_kind: &'static str,
    /// Source chain, truncated
    pub source_chain: Vec<String>,
    pub category: ErrorCategory,
    pub context: ErrorContext,
}

/// A raw failure enriched with classification and retry policy
#[derive(Debug, Clone)]
pub struct CategorizedError {
    pub id: Uuid,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub strategy: RecoveryStrategy,
    pub retryable: bool,
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_delay: Duration,
    pub user_message: String,
    pub technical_details: TechnicalDetails,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
    observed_at: Instant,
}

impl CategorizedError {
    /// Override the recovery strategy
    pub fn with_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Substitute data proposed by a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackData {
    /// Export again in this format
    AlternateFormat(ResolvedFormat),
    /// Write under this file name
    AlternateFileName(String),
}

/// Outcome of [`ErrorHandler::determine_recovery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    Retry { delay: Duration },
    Skip,
    Fallback(FallbackData),
    Abort { reason: String },
}

impl RecoveryDecision {
    /// Short action name for logs
    pub fn action(&self) -> &'static str {
        match self {
            RecoveryDecision::Retry { .. } => "retry",
            RecoveryDecision::Skip => "skip",
            RecoveryDecision::Fallback(_) => "fallback",
            RecoveryDecision::Abort { .. } => "abort",
        }
    }
}

struct CategoryPolicy {
    severity: ErrorSeverity,
    strategy: RecoveryStrategy,
    retryable: bool,
    max_retries: u32,
    retry_delay: Duration,
}

impl ErrorCategory {
    fn policy(self) -> CategoryPolicy {
        use ErrorSeverity::*;
        use RecoveryStrategy::*;

        let (severity, strategy, retryable, max_retries, delay_ms) = match self {
            ErrorCategory::Authentication => (High, Abort, false, 0, 0),
            ErrorCategory::RateLimit => (Medium, Retry, true, 5, 5000),
            ErrorCategory::Network => (Medium, Retry, true, 3, 2000),
            ErrorCategory::Server => (High, Retry, true, 3, 3000),
            ErrorCategory::Client => (Medium, Skip, false, 0, 0),
            ErrorCategory::FileSystem => (High, Retry, true, 2, 1000),
            ErrorCategory::Memory => (Critical, Abort, false, 0, 0),
            ErrorCategory::Timeout => (Medium, Retry, true, 2, 5000),
            ErrorCategory::Validation => (Low, Skip, false, 0, 0),
            ErrorCategory::Configuration => (High, Abort, false, 0, 0),
            ErrorCategory::Unknown => (Medium, Retry, true, 3, 1000),
        };

        CategoryPolicy {
            severity,
            strategy,
            retryable,
            max_retries,
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    fn description(self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication failed, check the API token",
            ErrorCategory::Network => "a network error occurred",
            ErrorCategory::Server => "the document service returned a server error",
            ErrorCategory::Client => "the document service rejected the request",
            ErrorCategory::RateLimit => "the API rate limit was exceeded",
            ErrorCategory::FileSystem => "a file system error occurred",
            ErrorCategory::Memory => "the process is running out of memory",
            ErrorCategory::Timeout => "the request timed out",
            ErrorCategory::Validation => "the data failed validation",
            ErrorCategory::Configuration => "the configuration is invalid",
            ErrorCategory::Unknown => "an unexpected error occurred",
        }
    }

    fn recommendation(self) -> &'static str {
        match self {
            ErrorCategory::Authentication => {
                "Verify the API token is valid and has access to the documents"
            }
            ErrorCategory::Network => "Check network connectivity to the document service",
            ErrorCategory::Server => "The document service is unstable; retry the export later",
            ErrorCategory::Client => {
                "Some documents can't be exported in the requested format; try html"
            }
            ErrorCategory::RateLimit => {
                "Lower requests_per_second or raise rate_limit_delay_ms"
            }
            ErrorCategory::FileSystem => {
                "Check output directory permissions and available disk space"
            }
            ErrorCategory::Memory => "Reduce batch concurrency or export fewer documents per run",
            ErrorCategory::Timeout => "Check connectivity; large documents may need more time",
            ErrorCategory::Validation => "Inspect the failing documents for malformed content",
            ErrorCategory::Configuration => "Run validate-config and fix the reported settings",
            ErrorCategory::Unknown => "Review the log file for the full error details",
        }
    }
}

enum Pattern {
    /// Substring of the lowercased haystack
    Text(&'static str),
    /// Whole token, for status codes
    Code(&'static str),
}

use Pattern::{Code, Text};

// Order matters: the first category with a matching pattern wins
const RULES: &[(ErrorCategory, &[Pattern])] = &[
    (
        ErrorCategory::Authentication,
        &[
            Text("unauthorized"),
            Text("authentication"),
            Text("invalid token"),
            Text("forbidden"),
            Code("401"),
            Code("403"),
            Text("access denied"),
            Text("api key"),
        ],
    ),
    (
        ErrorCategory::Network,
        &[
            Text("network"),
            Text("econnrefused"),
            Text("econnreset"),
            Text("enotfound"),
            Text("connection"),
            Text("socket"),
            Text("dns"),
        ],
    ),
    (
        ErrorCategory::Server,
        &[
            Text("servererror"),
            Code("500"),
            Code("502"),
            Code("503"),
            Code("504"),
            Text("internal server error"),
            Text("bad gateway"),
            Text("service unavailable"),
        ],
    ),
    (
        ErrorCategory::Client,
        &[
            Text("clienterror"),
            Code("400"),
            Code("404"),
            Code("405"),
            Code("409"),
            Code("422"),
            Text("bad request"),
            Text("not found"),
        ],
    ),
    (
        ErrorCategory::RateLimit,
        &[
            Text("rate limit"),
            Text("ratelimit"),
            Text("too many requests"),
            Code("429"),
            Text("throttl"),
        ],
    ),
    (
        ErrorCategory::FileSystem,
        &[
            Text("filesystem"),
            Text("enoent"),
            Text("eacces"),
            Text("eexist"),
            Text("enospc"),
            Text("permission denied"),
            Text("no such file"),
            Text("file exists"),
            Text("disk"),
            Text("directory"),
            Text("i/o error"),
        ],
    ),
    (
        ErrorCategory::Memory,
        &[
            Text("out of memory"),
            Text("heap"),
            Text("allocation"),
            Text("memory"),
        ],
    ),
    (ErrorCategory::Timeout, &[Text("timeout"), Text("timed out")]),
    (
        ErrorCategory::Validation,
        &[
            Text("validation"),
            Text("invalid"),
            Text("malformed"),
            Text("schema"),
        ],
    ),
    (
        ErrorCategory::Configuration,
        &[
            Text("config"),
            Text("missing required"),
            Text("not configured"),
        ],
    ),
];

/// Classify an error message (with its kind name) into a category
pub fn classify(kind: &str, message: &str) -> ErrorCategory {
    let haystack = format!("{kind} {message}").to_lowercase();
    let tokens: Vec<&str> = haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    RULES
        .iter()
        .find(|(_, patterns)| {
            patterns.iter().any(|pattern| match pattern {
                Text(text) => haystack.contains(text),
                Code(code) => tokens.contains(code),
            })
        })
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Aggregate error counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStatistics {
    pub total_errors: u64,
    pub by_category: BTreeMap<ErrorCategory, u64>,
    pub by_severity: BTreeMap<ErrorSeverity, u64>,
    pub retryable_errors: u64,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// One history entry as shown in reports
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReportEntry {
    pub id: Uuid,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub user_message: String,
    pub operation: String,
    pub document_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&CategorizedError> for ErrorReportEntry {
    fn from(error: &CategorizedError) -> Self {
        Self {
            id: error.id,
            category: error.category,
            severity: error.severity,
            user_message: error.user_message.clone(),
            operation: error.context.operation.clone(),
            document_id: error.context.document_id.clone(),
            timestamp: error.timestamp,
        }
    }
}

/// Error report over the bounded history
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub generated_at: DateTime<Utc>,
    pub statistics: ErrorStatistics,
    /// Most recent errors, newest first
    pub recent_errors: Vec<ErrorReportEntry>,
    /// Categories by frequency, most frequent first
    pub top_categories: Vec<(ErrorCategory, u64)>,
    pub recommendations: Vec<String>,
    pub should_abort: bool,
}

#[derive(Default)]
struct HandlerState {
    history: VecDeque<CategorizedError>,
    statistics: ErrorStatistics,
}

/// Classifies failures and decides how to recover from them
pub struct ErrorHandler {
    max_history_size: usize,
    strategy_overrides: BTreeMap<ErrorCategory, RecoveryStrategy>,
    state: Mutex<HandlerState>,
}

impl ErrorHandler {
    /// Create a handler keeping at most `max_history_size` errors
    pub fn new(max_history_size: usize) -> Self {
        Self {
            max_history_size: max_history_size.max(1),
            strategy_overrides: BTreeMap::new(),
            state: Mutex::new(HandlerState::default()),
        }
    }

    /// Create a handler from configuration
    pub fn from_settings(settings: &ErrorHandlingSettings) -> Self {
        settings.strategy_overrides.iter().fold(
            Self::new(settings.max_history_size),
            |handler, (category, strategy)| handler.with_strategy_override(*category, *strategy),
        )
    }

    /// Replace the built-in recovery strategy for `category`
    ///
    /// Forcing [`RecoveryStrategy::Retry`] onto a category that is not
    /// retryable by default gives it the retry budget of
    /// [`ErrorCategory::Unknown`].
    pub fn with_strategy_override(
        mut self,
        category: ErrorCategory,
        strategy: RecoveryStrategy,
    ) -> Self {
        self.strategy_overrides.insert(category, strategy);
        self
    }

    fn policy_for(&self, category: ErrorCategory) -> CategoryPolicy {
        let mut policy = category.policy();
        let Some(&strategy) = self.strategy_overrides.get(&category) else {
            return policy;
        };

        policy.strategy = strategy;
        if strategy == RecoveryStrategy::Retry && !policy.retryable {
            let fallback = ErrorCategory::Unknown.policy();
            policy.retryable = true;
            policy.max_retries = fallback.max_retries;
            policy.retry_delay = fallback.retry_delay;
        } else if strategy != RecoveryStrategy::Retry {
            policy.retryable = false;
        }
        policy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classify `error` without recording it
    pub fn categorize(&self, error: &QuipError, context: ErrorContext) -> CategorizedError {
        let message = error.to_string();
        let category = classify(error.kind(), &message);
        let policy = self.policy_for(category);

        let mut source_chain = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            if source_chain.len() == MAX_SOURCE_CHAIN {
                break;
            }
            source_chain.push(cause.to_string());
            source = cause.source();
        }

        let user_message = user_message(category, &context);

        CategorizedError {
            id: Uuid::new_v4(),
            category,
            severity: policy.severity,
            strategy: policy.strategy,
            retryable: policy.retryable,
            max_retries: policy.max_retries,
            retry_delay: policy.retry_delay,
            user_message,
            technical_details: TechnicalDetails {
                original_message: message,
                error_kind: error.kind(),
                source_chain,
                category,
                context: context.clone(),
            },
            context,
            timestamp: Utc::now(),
            observed_at: Instant::now(),
        }
    }

    /// Classify `error`, record it, and log it
    pub fn handle_error(&self, error: &QuipError, context: ErrorContext) -> CategorizedError {
        let categorized = self.categorize(error, context);
        self.record(&categorized);
        log_error(&categorized);
        categorized
    }

    fn record(&self, error: &CategorizedError) {
        let mut state = self.lock();

        let stats = &mut state.statistics;
        stats.total_errors += 1;
        *stats.by_category.entry(error.category).or_insert(0) += 1;
        *stats.by_severity.entry(error.severity).or_insert(0) += 1;
        if error.retryable {
            stats.retryable_errors += 1;
        }
        stats.last_error_at = Some(error.timestamp);

        state.history.push_back(error.clone());
        while state.history.len() > self.max_history_size {
            state.history.pop_front();
        }
    }

    /// Turn an error's strategy into a single recovery decision
    pub fn determine_recovery(&self, error: &CategorizedError) -> RecoveryDecision {
        match error.strategy {
            RecoveryStrategy::Retry => {
                if error.retryable && error.context.attempt_number < error.max_retries {
                    RecoveryDecision::Retry {
                        delay: backoff_delay(error.retry_delay, error.context.attempt_number),
                    }
                } else {
                    RecoveryDecision::Skip
                }
            }
            RecoveryStrategy::Skip => RecoveryDecision::Skip,
            RecoveryStrategy::Fallback => match fallback_for(error) {
                Some(data) => RecoveryDecision::Fallback(data),
                None => RecoveryDecision::Skip,
            },
            RecoveryStrategy::Abort => RecoveryDecision::Abort {
                reason: error.user_message.clone(),
            },
            RecoveryStrategy::Manual => RecoveryDecision::Abort {
                reason: format!("Manual intervention required: {}", error.user_message),
            },
        }
    }

    /// Whether recent errors warrant stopping the whole operation
    ///
    /// True when the last five minutes hold at least 3 critical errors,
    /// 5 authentication errors, or 20 errors of any kind.
    pub fn should_abort_operation(&self) -> bool {
        let state = self.lock();
        let recent: Vec<&CategorizedError> = state
            .history
            .iter()
            .filter(|e| e.observed_at.elapsed() <= ABORT_WINDOW)
            .collect();

        let critical = recent
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Critical)
            .count();
        let auth = recent
            .iter()
            .filter(|e| e.category == ErrorCategory::Authentication)
            .count();

        critical >= ABORT_CRITICAL_THRESHOLD
            || auth >= ABORT_AUTH_THRESHOLD
            || recent.len() >= ABORT_TOTAL_THRESHOLD
    }

    /// Errors observed within `window`, oldest first
    pub fn get_recent_errors(&self, window: Duration) -> Vec<CategorizedError> {
        self.lock()
            .history
            .iter()
            .filter(|e| e.observed_at.elapsed() <= window)
            .cloned()
            .collect()
    }

    /// Errors in `category`, oldest first
    pub fn get_errors_by_category(&self, category: ErrorCategory) -> Vec<CategorizedError> {
        self.lock()
            .history
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    /// Snapshot of the aggregate counters
    pub fn statistics(&self) -> ErrorStatistics {
        self.lock().statistics.clone()
    }

    /// Number of errors currently held in history
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// Build a report over the current history
    pub fn generate_error_report(&self) -> ErrorReport {
        let should_abort = self.should_abort_operation();
        let state = self.lock();

        let recent_errors = state
            .history
            .iter()
            .rev()
            .take(REPORT_RECENT_ERRORS)
            .map(ErrorReportEntry::from)
            .collect();

        let mut top_categories: Vec<(ErrorCategory, u64)> = state
            .statistics
            .by_category
            .iter()
            .map(|(category, count)| (*category, *count))
            .collect();
        top_categories.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let recommendations = top_categories
            .iter()
            .map(|(category, _)| category.recommendation().to_string())
            .collect();

        ErrorReport {
            generated_at: Utc::now(),
            statistics: state.statistics.clone(),
            recent_errors,
            top_categories,
            recommendations,
            should_abort,
        }
    }

    /// Clear history and statistics
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = HandlerState::default();
        tracing::info!("Error handler history and statistics cleared");
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(ErrorHandlingSettings::default().max_history_size)
    }
}

/// Exponential backoff with jitter, capped at [`MAX_RETRY_DELAY`]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    base.saturating_mul(multiplier)
        .saturating_add(jitter)
        .min(MAX_RETRY_DELAY)
}

fn fallback_for(error: &CategorizedError) -> Option<FallbackData> {
    match error.category {
        ErrorCategory::Client if error.context.operation.contains("export") => {
            Some(FallbackData::AlternateFormat(ResolvedFormat::Html))
        }
        ErrorCategory::FileSystem => {
            let title = error.context.document_title.as_deref().unwrap_or("untitled");
            let suffix: String = error.id.simple().to_string().chars().take(8).collect();
            Some(FallbackData::AlternateFileName(format!(
                "{}_{}",
                sanitize_file_name(title),
                suffix
            )))
        }
        _ => None,
    }
}

fn user_message(category: ErrorCategory, context: &ErrorContext) -> String {
    let operation = if context.operation.is_empty() {
        "operation"
    } else {
        context.operation.as_str()
    };

    match (&context.document_title, &context.document_id) {
        (Some(title), _) => format!(
            "{} failed for \"{}\": {}",
            operation,
            title,
            category.description()
        ),
        (None, Some(id)) => format!(
            "{} failed for document {}: {}",
            operation,
            id,
            category.description()
        ),
        (None, None) => format!("{} failed: {}", operation, category.description()),
    }
}

fn log_error(error: &CategorizedError) {
    let details = &error.technical_details;
    match error.severity {
        ErrorSeverity::Critical => tracing::error!(
            error_id = %error.id,
            category = %error.category,
            severity = %error.severity,
            operation = %error.context.operation,
            document_id = ?error.context.document_id,
            detail = %details.original_message,
            "CRITICAL: {}",
            error.user_message
        ),
        ErrorSeverity::High => tracing::error!(
            error_id = %error.id,
            category = %error.category,
            operation = %error.context.operation,
            document_id = ?error.context.document_id,
            detail = %details.original_message,
            "{}",
            error.user_message
        ),
        ErrorSeverity::Medium => tracing::warn!(
            error_id = %error.id,
            category = %error.category,
            operation = %error.context.operation,
            document_id = ?error.context.document_id,
            detail = %details.original_message,
            "{}",
            error.user_message
        ),
        ErrorSeverity::Low => tracing::debug!(
            error_id = %error.id,
            category = %error.category,
            operation = %error.context.operation,
            detail = %details.original_message,
            "{}",
            error.user_message
        ),
    }
}
