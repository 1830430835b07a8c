//! Command-line interface for voxchain
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Frame-streaming engine for voice pipelines, driven offline with mock services
#[derive(Parser, Debug)]
#[command(name = "voxchain", version, about = "Frame-streaming engine for voice pipelines")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress frame output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: engine events, -vv: every frame and driver step)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speak one text through the TTS stage
    Say {
        /// Text to speak
        text: String,

        /// Speak text as-is instead of waiting for a full sentence
        #[arg(long)]
        no_aggregate: bool,

        /// Maximum bytes per audio frame (default: from config)
        #[arg(long, value_name = "BYTES")]
        chunk_bytes: Option<usize>,
    },

    /// Run a conversation: user aggregator → LLM → assistant aggregator → TTS
    Chat {
        /// User utterances, one turn each
        #[arg(required = true, value_name = "UTTERANCE")]
        utterances: Vec<String>,

        /// Fixed assistant reply (default: echo the user)
        #[arg(long, value_name = "TEXT")]
        reply: Option<String>,

        /// System prompt (default: from config)
        #[arg(long, value_name = "TEXT")]
        system: Option<String>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_say() {
        let cli = Cli::try_parse_from(["voxchain", "say", "Hello there!"]).unwrap();
        match cli.command {
            Commands::Say {
                text,
                no_aggregate,
                chunk_bytes,
            } => {
                assert_eq!(text, "Hello there!");
                assert!(!no_aggregate);
                assert!(chunk_bytes.is_none());
            }
            _ => panic!("Expected Say command"),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_say_with_options() {
        let cli = Cli::try_parse_from([
            "voxchain",
            "say",
            "Hi",
            "--no-aggregate",
            "--chunk-bytes",
            "3200",
        ])
        .unwrap();
        match cli.command {
            Commands::Say {
                no_aggregate,
                chunk_bytes,
                ..
            } => {
                assert!(no_aggregate);
                assert_eq!(chunk_bytes, Some(3200));
            }
            _ => panic!("Expected Say command"),
        }
    }

    #[test]
    fn test_parse_chat_multiple_utterances() {
        let cli = Cli::try_parse_from([
            "voxchain",
            "chat",
            "Hello.",
            "How are you?",
            "--reply",
            "Fine, thanks.",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                utterances,
                reply,
                system,
            } => {
                assert_eq!(utterances, vec!["Hello.", "How are you?"]);
                assert_eq!(reply.as_deref(), Some("Fine, thanks."));
                assert!(system.is_none());
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_parse_chat_requires_utterance() {
        assert!(Cli::try_parse_from(["voxchain", "chat"]).is_err());
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["voxchain", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["voxchain", "-vv", "config", "path"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "voxchain",
            "say",
            "x",
            "--quiet",
            "--config",
            "/path/to/config.toml",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["voxchain"]).is_err());
    }
}
