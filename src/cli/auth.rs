//! Login, registration, logout, refresh and token commands

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use serde::Serialize;

use tokenkeeper::error::{Error, Result};
use tokenkeeper::Identity;

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::output;

/// Use the flag value or ask for it
fn username_or_prompt(username: Option<String>) -> Result<String> {
    match username {
        Some(username) => Ok(username),
        None => Ok(Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Username")
            .interact_text()?),
    }
}

fn print_identity(format: OutputFormat, headline: &str, identity: &Identity) -> Result<()> {
    match format {
        OutputFormat::Json => output::print_json(identity),
        OutputFormat::Pretty => {
            println!(
                "{} {} {} ({})",
                "✓".green(),
                headline,
                identity.username.bold(),
                identity.role.to_string().cyan()
            );
            Ok(())
        }
    }
}

/// Sign in and persist the session
pub async fn login(
    opts: &GlobalOptions,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    let username = username_or_prompt(username)?;
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()?,
    };

    if ctx.format == OutputFormat::Pretty {
        println!("{}", "Signing in...".cyan());
    }
    let identity = ctx.manager.login(&username, &password).await?;
    print_identity(ctx.format, "Signed in as", &identity)
}

/// Create an account without signing in
pub async fn register(
    opts: &GlobalOptions,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    let username = username_or_prompt(username)?;
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    let user = ctx.manager.register(&username, &password).await?;
    match ctx.format {
        OutputFormat::Json => output::print_json(&user),
        OutputFormat::Pretty => {
            println!("{} Account {} created", "✓".green(), user.username.bold());
            println!("  → Run {} to sign in", "tokenkeeper login".cyan());
            Ok(())
        }
    }
}

/// Sign out and wipe stored credentials
pub async fn logout(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let was_signed_in = ctx.manager.current();
    ctx.manager.logout();

    match ctx.format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct LogoutResult {
                signed_out: Option<Identity>,
            }
            output::print_json(&LogoutResult {
                signed_out: was_signed_in,
            })
        }
        OutputFormat::Pretty => {
            match was_signed_in {
                Some(identity) => {
                    println!("{} Signed out {}", "✓".green(), identity.username.bold())
                }
                None => println!("{} No active session", "○".dimmed()),
            }
            Ok(())
        }
    }
}

/// Renew the stored session immediately
pub async fn refresh(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let identity = ctx.manager.refresh_now().await?;
    print_identity(ctx.format, "Session renewed for", &identity)
}

/// Print the access token for use in scripts
pub async fn token(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let token = ctx
        .manager
        .token()
        .ok_or_else(|| Error::Other("Not signed in. Run 'tokenkeeper login' first".to_string()))?;

    match ctx.format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct TokenView<'a> {
                token: &'a str,
            }
            output::print_json(&TokenView { token: &token })
        }
        OutputFormat::Pretty => {
            println!("{}", token);
            Ok(())
        }
    }
}
