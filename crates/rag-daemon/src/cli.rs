//! CLI argument parsing for the chat daemon.

use clap::{Parser, Subcommand};

/// Retrieval-augmented chat
///
/// Answers questions from a local document index, escalating to web
/// search when the retrieved context looks insufficient.
#[derive(Parser, Debug)]
#[command(name = "rag-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/rag-chat/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// Session to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Number of documents to retrieve
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// The question
        question: String,
    },

    /// Interactive chat over stdin
    Chat {
        /// Session to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Session management
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Build the document index from a JSONL corpus
    Ingest {
        /// JSONL file, one {"content": ..., "metadata": {...}} per line
        #[arg(short, long)]
        input: String,

        /// Index directory (default from config)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// List sessions, most recent first
    List,

    /// Create a session
    Create {
        #[arg(short, long, default_value = "New chat")]
        title: String,
    },

    /// Delete a session and its history
    Delete { session_id: String },

    /// Print a session's messages
    History { session_id: String },

    /// Print stored session, message and cached-state counts
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_ask() {
        let cli = Cli::parse_from(["rag-daemon", "ask", "Who won?"]);
        match cli.command {
            Commands::Ask {
                session,
                top_k,
                question,
            } => {
                assert_eq!(question, "Who won?");
                assert!(session.is_none());
                assert!(top_k.is_none());
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_cli_ask_with_session_and_k() {
        let cli = Cli::parse_from(["rag-daemon", "ask", "-s", "01ABC", "-k", "3", "Why?"]);
        match cli.command {
            Commands::Ask { session, top_k, .. } => {
                assert_eq!(session.as_deref(), Some("01ABC"));
                assert_eq!(top_k, Some(3));
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "rag-daemon",
            "config",
            "--log-level",
            "debug",
            "--config",
            "/tmp/rag.toml",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config.as_deref(), Some("/tmp/rag.toml"));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_cli_sessions_create_default_title() {
        let cli = Cli::parse_from(["rag-daemon", "sessions", "create"]);
        match cli.command {
            Commands::Sessions {
                command: SessionCommands::Create { title },
            } => assert_eq!(title, "New chat"),
            _ => panic!("Expected Sessions Create command"),
        }
    }

    #[test]
    fn test_cli_sessions_history() {
        let cli = Cli::parse_from(["rag-daemon", "sessions", "history", "01XYZ"]);
        match cli.command {
            Commands::Sessions {
                command: SessionCommands::History { session_id },
            } => assert_eq!(session_id, "01XYZ"),
            _ => panic!("Expected Sessions History command"),
        }
    }

    #[test]
    fn test_cli_sessions_stats() {
        let cli = Cli::parse_from(["rag-daemon", "sessions", "stats"]);
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                command: SessionCommands::Stats
            }
        ));
    }

    #[test]
    fn test_cli_ingest() {
        let cli = Cli::parse_from(["rag-daemon", "ingest", "--input", "docs.jsonl"]);
        match cli.command {
            Commands::Ingest { input, output } => {
                assert_eq!(input, "docs.jsonl");
                assert!(output.is_none());
            }
            _ => panic!("Expected Ingest command"),
        }
    }

    #[test]
    fn test_cli_ask_requires_question() {
        assert!(Cli::try_parse_from(["rag-daemon", "ask"]).is_err());
    }
}
