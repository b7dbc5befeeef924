//! Status command implementation

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use tokenkeeper::Identity;
use tokenkeeper::error::Result;

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::output;

#[derive(Debug, Serialize)]
struct StatusReport {
    config_file: String,
    config_file_exists: bool,
    endpoint: String,
    identity: Option<Identity>,
    expires_at: Option<DateTime<Utc>>,
    renewal: String,
}

/// Run the status command to display session status
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let record = ctx.manager.record();

    let report = StatusReport {
        config_file: ctx.config_path.display().to_string(),
        config_file_exists: ctx.config_path.exists(),
        endpoint: ctx.config.endpoint.clone(),
        identity: ctx.manager.current(),
        expires_at: record.as_ref().map(|r| r.expires_at),
        renewal: ctx.manager.renewal_state().to_string(),
    };

    if ctx.format == OutputFormat::Json {
        return output::print_json(&report);
    }

    println!("{}\n", "tokenkeeper Session Status".bold());

    if report.config_file_exists {
        println!("Config file: {}", report.config_file.cyan());
    } else {
        println!(
            "Config file: {} {}",
            report.config_file.cyan(),
            "(not found, using defaults)".dimmed()
        );
    }
    println!("Endpoint: {}", report.endpoint.cyan());
    println!();

    match (&report.identity, &record) {
        (Some(identity), Some(record)) => {
            println!(
                "{} Signed in as {} ({})",
                "✓".green(),
                identity.username.bold(),
                identity.role
            );

            let remaining = record.time_until_expiry();
            println!(
                "{} Session expires in {}h {}m",
                "✓".green(),
                remaining.num_hours(),
                remaining.num_minutes() % 60
            );
            println!("{} Renewal: {}", "○".dimmed(), report.renewal);
        }
        _ => {
            println!("{} Not signed in", "✗".red());
            println!("  → Run '{}' to start a session", "tokenkeeper login".cyan());
        }
    }

    println!();
    Ok(())
}
