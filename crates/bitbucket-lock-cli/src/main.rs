//! bitbucket-lock: run a backup while a Bitbucket Server maintenance lock is held

mod logging;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use bitbucket_lock::LockSession;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::settings::{Overrides, Settings};

/// Environment variables handed to the backup command
const UNLOCK_TOKEN_ENV: &str = "BITBUCKET_UNLOCK_TOKEN";
const CANCEL_TOKEN_ENV: &str = "BITBUCKET_CANCEL_TOKEN";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "bitbucket-lock", version, about)]
struct Cli {
    /// Config file (default: conf/bitbucket-lock.yml, if present)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Bitbucket server base address
    #[arg(short = 's', long = "server", env = "BITBUCKET_SERVER")]
    server: Option<String>,
    #[arg(short = 'u', long = "username", env = "BITBUCKET_USERNAME")]
    username: Option<String>,
    #[arg(long = "password", env = "BITBUCKET_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Verify the server TLS certificate
    #[arg(long = "verify-tls")]
    verify_tls: bool,
    /// Skip TLS certificate verification, overriding the config file
    #[arg(long = "insecure", conflicts_with = "verify_tls")]
    insecure: bool,
    /// Give up waiting for drain after this many seconds (0 waits forever)
    #[arg(long = "drain-timeout")]
    drain_timeout_secs: Option<u64>,
    #[arg(long = "log-level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current database and SCM maintenance states
    Status,
    /// Acquire the lock, run a backup command, then release the lock
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            verify_tls: match (self.verify_tls, self.insecure) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            drain_timeout_secs: self.drain_timeout_secs,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref(), &cli.overrides()).context("Failed to load settings")?;
    let _guard = logging::init_logging(&settings.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let mut session =
        LockSession::new(settings.client_config()).context("Failed to create HTTP client")?;

    match cli.command {
        Command::Status => {
            let status = session
                .maintenance_status()
                .await
                .context("Failed to fetch maintenance status")?;
            println!("db-state: {}", status.db_state);
            println!("scm-state: {}", status.scm_state);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { command } => run_locked(&mut session, &command).await,
    }
}

/// Run `command` between acquire and release, returning its exit code
async fn run_locked(session: &mut LockSession, command: &[String]) -> anyhow::Result<ExitCode> {
    let (program, args) = command.split_first().context("No backup command given")?;

    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    if let Err(e) = session.acquire_with_cancel(cancel).await {
        if session.pending_unlock_token().is_some()
            && let Err(abort_err) = session.abort().await
        {
            error!(
                unlock_token = session.pending_unlock_token().unwrap_or_default(),
                error = %abort_err,
                "Server may still be in maintenance mode; release the lock with this token"
            );
        }
        return Err(e).context("Failed to acquire maintenance lock");
    }

    info!(program = %program, "Running backup command under maintenance lock");
    let status = tokio::process::Command::new(program)
        .args(args)
        .env(UNLOCK_TOKEN_ENV, session.unlock_token()?)
        .env(CANCEL_TOKEN_ENV, session.cancel_token()?)
        .status()
        .await;

    // Always release, even if the command could not be started
    let released = session.release().await;
    let status = status.with_context(|| format!("Failed to run {}", program))?;
    released.context("Failed to release maintenance lock")?;

    match status.code() {
        Some(0) => {
            info!("Backup command finished");
            Ok(ExitCode::SUCCESS)
        }
        Some(code) => {
            warn!(code, "Backup command failed");
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        None => {
            warn!("Backup command terminated by signal");
            Ok(ExitCode::FAILURE)
        }
    }
}
