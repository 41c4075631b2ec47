#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use flitsconfig::{FlitsConfig, StoredSession};
use flitsmeister::{Auth, Error as FlitsmeisterError, FlitsmeisterClient};
use std::process;
use tracing_subscriber::EnvFilter;
mod report;

#[derive(Parser)]
#[command(name = "flits", about = "A CLI for the Flitsmeister account API")]
struct Cli {
    /// Log requests and responses to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with the configured credentials and remember the session
    Login,
    /// Forget the remembered session
    Logout,
    /// Show the account profile
    User {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show aggregate driving statistics
    Statistics {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "flitsmeister=debug,flits=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn new_client(config: &FlitsConfig) -> FlitsmeisterClient {
    FlitsmeisterClient::new().with_request_timeout(config.request_timeout())
}

/// Logs in with the configured credentials and persists the new session.
async fn login(client: &mut FlitsmeisterClient, config: &mut FlitsConfig) -> Result<Auth> {
    let credentials = config
        .credentials()
        .with_context(|| "Missing credentials in flitsmeister config")?;
    let auth = client
        .login(&credentials.username, &credentials.password)
        .await
        .with_context(|| format!("Login as {} failed", credentials.username))?;
    config.remember(&auth);
    config
        .store()
        .with_context(|| "Failed to store session in flitsmeister config")?;
    Ok(auth)
}

/// Returns a client holding the remembered session, logging in again when it
/// is missing, unreadable, or expired.
async fn get_client(config: &mut FlitsConfig) -> Result<FlitsmeisterClient> {
    let mut client = new_client(config);
    match config.session.as_ref().map(StoredSession::to_auth).transpose() {
        Ok(Some(auth)) if !auth.is_access_token_expired() => return Ok(client.with_auth(auth)),
        Ok(Some(_)) => tracing::info!("remembered access token expired, logging in again"),
        Ok(None) => tracing::debug!("no remembered session, logging in"),
        Err(err) => tracing::warn!(error = %err, "ignoring unreadable remembered session"),
    }
    let auth = login(&mut client, config).await?;
    Ok(client.with_auth(auth))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| "Failed to format JSON")?;
    println!("{json}");
    Ok(())
}

fn handle_error(err: &anyhow::Error) -> ! {
    match err.downcast_ref::<FlitsmeisterError>() {
        Some(FlitsmeisterError::NotAuthenticated) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            eprintln!("Run `flits login` first.");
        }
        Some(FlitsmeisterError::Timeout(_)) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            eprintln!("Raise `request_timeout_secs` in the flitsmeister config to wait longer.");
        }
        _ => eprintln!("{} {err:#}", "error:".red().bold()),
    }
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        handle_error(&err);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "flits", &mut std::io::stdout());
        }
        Command::Login => {
            let mut config = FlitsConfig::load_or_onboard()
                .with_context(|| "Failed to load flitsmeister config")?;
            let mut client = new_client(&config);
            let auth = login(&mut client, &mut config).await?;
            let user = auth.object_id().unwrap_or("unknown user");
            match auth.access_token_expires() {
                Some(expires) => println!(
                    "Logged in as {}, access token valid until {}",
                    user.bold(),
                    report::local_time(expires)
                ),
                None => println!("Logged in as {}", user.bold()),
            }
        }
        Command::Logout => {
            let mut config =
                FlitsConfig::load().with_context(|| "Failed to load flitsmeister config")?;
            config.forget();
            config
                .store()
                .with_context(|| "Failed to store flitsmeister config")?;
            println!("Forgot remembered session.");
        }
        Command::User { json } => {
            let mut config = FlitsConfig::load_or_onboard()
                .with_context(|| "Failed to load flitsmeister config")?;
            let mut client = get_client(&mut config).await?;
            let user = client.user().await?;
            if json {
                print_json(&user)?;
            } else {
                print!("{}", report::format_user(&user));
            }
        }
        Command::Statistics { json } => {
            let mut config = FlitsConfig::load_or_onboard()
                .with_context(|| "Failed to load flitsmeister config")?;
            let mut client = get_client(&mut config).await?;
            let stats = client.statistics().await?;
            if json {
                print_json(&stats)?;
            } else {
                print!("{}", report::format_statistics(&stats));
            }
        }
    }

    Ok(())
}
