//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::AppConfig;
use crate::domain::errors::QuipError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into AppConfig
/// 4. Applies environment variable overrides (QUIP_EXPORT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use quip_export::config::loader::load_config;
///
/// let config = load_config("quip-export.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(QuipError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        QuipError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: AppConfig = toml::from_str(&contents)
        .map_err(|e| QuipError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        QuipError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are passed through untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| QuipError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(QuipError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the QUIP_EXPORT_* prefix
///
/// Variables follow the pattern `QUIP_EXPORT_<SECTION>_<KEY>`, e.g.
/// `QUIP_EXPORT_EXPORT_OUTPUT_DIRECTORY`. Unparseable numeric values are
/// ignored.
fn apply_env_overrides(config: &mut AppConfig) {
    // Application overrides
    if let Ok(val) = std::env::var("QUIP_EXPORT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // Export overrides
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_OUTPUT_DIRECTORY") {
        config.export.output_directory = val;
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_FORMAT") {
        config.export.export_format = val;
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_MAX_DOCUMENTS") {
        if let Ok(max) = val.parse() {
            config.export.max_documents = Some(max);
        }
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_RATE_LIMIT_DELAY_MS") {
        if let Ok(delay) = val.parse() {
            config.export.rate_limit_delay_ms = delay;
        }
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_RETRY_ATTEMPTS") {
        if let Ok(retries) = val.parse() {
            config.export.retry_attempts = retries;
        }
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_EXPORT_CONFLICT_RESOLUTION") {
        config.export.conflict_resolution = val;
    }

    // Resilience overrides
    if let Ok(val) = std::env::var("QUIP_EXPORT_RATE_LIMIT_REQUESTS_PER_SECOND") {
        if let Ok(rps) = val.parse() {
            config.resilience.rate_limit.requests_per_second = rps;
        }
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_RATE_LIMIT_BURST_SIZE") {
        if let Ok(burst) = val.parse() {
            config.resilience.rate_limit.burst_size = burst;
        }
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
        if let Ok(threshold) = val.parse() {
            config.resilience.circuit_breaker.failure_threshold = threshold;
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("QUIP_EXPORT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("QUIP_EXPORT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("QUIP_TEST_OUTPUT_DIR", "/tmp/quip");
        let input = "output_directory = \"${QUIP_TEST_OUTPUT_DIR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "output_directory = \"/tmp/quip\"\n");
        std::env::remove_var("QUIP_TEST_OUTPUT_DIR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("QUIP_TEST_MISSING_VAR");
        let input = "output_directory = \"${QUIP_TEST_MISSING_VAR}\"";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_substitute_env_vars_skips_comments() {
        std::env::remove_var("QUIP_TEST_COMMENTED");
        let input = "# output_directory = \"${QUIP_TEST_COMMENTED}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[export]
output_directory = "./exports"
export_format = "html"
retry_attempts = 2
conflict_resolution = "overwrite"

[resilience.rate_limit]
requests_per_second = 1.5
burst_size = 3

[resilience.circuit_breaker]
failure_threshold = 4
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.export.output_directory, "./exports");
        assert_eq!(config.export.retry_attempts, 2);
        assert_eq!(config.resilience.rate_limit.burst_size, 3);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 4);
        assert_eq!(config.resilience.circuit_breaker.success_threshold, 2);
    }

    #[test]
    fn test_load_config_invalid_export_section() {
        let toml_content = r#"
[export]
output_directory = "./exports"
export_format = "pdf"
retry_attempts = 12
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'pdf'"));
        assert!(message.contains("retry_attempts"));
    }
}
