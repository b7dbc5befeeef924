//! CLI command definitions and handlers

use clap::{Parser, Subcommand};

pub mod args;
pub mod auth;
pub mod context;
pub mod status;
pub mod watch;

pub use args::OutputFormat;
pub use context::CommandContext;

/// tokenkeeper - client-side session manager with proactive token renewal
#[derive(Parser, Debug)]
#[command(name = "tokenkeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, json)
    #[arg(
        long,
        global = true,
        env = "TOKENKEEPER_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "TOKENKEEPER_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override the GraphQL endpoint
    #[arg(long, global = true, env = "TOKENKEEPER_ENDPOINT", hide_env = true)]
    pub endpoint: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "TOKENKEEPER_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Username (prompted when omitted)
        #[arg(long, short)]
        username: Option<String>,

        /// Password (prompted when omitted)
        #[arg(long, env = "TOKENKEEPER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        /// Username (prompted when omitted)
        #[arg(long, short)]
        username: Option<String>,

        /// Password (prompted with confirmation when omitted)
        #[arg(long, env = "TOKENKEEPER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and remove stored credentials
    Logout,

    /// Renew the stored session now
    Refresh,

    /// Show the signed-in user and session timing
    Status,

    /// Print the current access token
    Token,

    /// Keep the session alive and print identity changes until interrupted
    Watch,
}
