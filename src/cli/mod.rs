//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for quip-export using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// quip-export - Resilient batch exporter for Quip documents
#[derive(Parser, Debug)]
#[command(name = "quip-export")]
#[command(version, about, long_about = None)]
#[command(author = "quip-export Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "quip-export.toml", env = "QUIP_EXPORT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "QUIP_EXPORT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export documents listed by a manifest to the output directory
    Export(commands::export::ExportArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_export() {
        let cli = Cli::parse_from(["quip-export", "export"]);
        assert_eq!(cli.config, "quip-export.toml");
        assert!(matches!(cli.command, Commands::Export(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["quip-export", "--config", "custom.toml", "export"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["quip-export", "--log-level", "debug", "export"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_export_overrides() {
        let cli = Cli::parse_from([
            "quip-export",
            "export",
            "--manifest",
            "docs.json",
            "--format",
            "html",
            "--max-documents",
            "25",
            "--yes",
        ]);
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.manifest, "docs.json");
                assert_eq!(args.format.as_deref(), Some("html"));
                assert_eq!(args.max_documents, Some(25));
                assert!(args.yes);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["quip-export", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["quip-export", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
