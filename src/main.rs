//! tokenkeeper CLI - sign in, inspect and keep a session alive

use clap::Parser;
use colored::Colorize;

mod cli;
mod output;

use cli::args::GlobalOptions;
use cli::{Cli, Commands};
use tokenkeeper::error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

/// `warn` by default, `debug` with --debug; RUST_LOG wins over both
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
    log::debug!("Debug logging enabled");
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Login { username, password } => {
            cli::auth::login(&opts, username, password).await
        }
        Commands::Register { username, password } => {
            cli::auth::register(&opts, username, password).await
        }
        Commands::Logout => cli::auth::logout(&opts).await,
        Commands::Refresh => cli::auth::refresh(&opts).await,
        Commands::Token => cli::auth::token(&opts).await,
        Commands::Status => cli::status::run(&opts).await,
        Commands::Watch => cli::watch::run(&opts).await,
    }
}
