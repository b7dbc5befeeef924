//! Watch command: keep the session alive in the foreground

use colored::Colorize;
use futures::StreamExt;

use tokenkeeper::error::Result;

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::output;

/// Print every identity change until Ctrl-C.
///
/// Renewal and auto-logout keep running while this waits, so the stored
/// session stays fresh for as long as the command is up.
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let mut changes = ctx.manager.observe();

    if ctx.format == OutputFormat::Pretty {
        println!("{}", "Watching session (Ctrl-C to stop)".bold());
    }

    loop {
        tokio::select! {
            change = changes.next() => {
                let Some(identity) = change else { break };
                match ctx.format {
                    OutputFormat::Json => output::print_json(&identity)?,
                    OutputFormat::Pretty => match identity {
                        Some(identity) => println!(
                            "{} {} ({})",
                            "●".green(),
                            identity.username.bold(),
                            identity.role
                        ),
                        None => println!("{} signed out", "○".dimmed()),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::debug!("Interrupted, stopping watch");
                break;
            }
        }
    }

    ctx.manager.shutdown();
    Ok(())
}
