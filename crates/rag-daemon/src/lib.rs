//! Chat daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ask, chat, sessions, ingest, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, SessionCommands};
pub use commands::{
    handle_ask, handle_chat, handle_ingest, handle_sessions, init_logging, load_settings,
    show_config, StdoutHandler,
};
