//! API probe
//!
//! Command-line client for the task API that sends every call through the
//! authenticated pipeline:
//! 1. Loads config and the persisted session (if any)
//! 2. Signs in when there is no session and credentials are configured
//! 3. Runs one command (`request`, `whoami`, `logout`)
//! 4. Reports session ends and, with `--metrics`, the Prometheus exposition

mod config;
mod error;
mod metrics;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use api_transport::{ApiRequest, Method, ReqwestTransport};
use auth_pipeline::{AuthenticatedClient, ChannelNavigator, LoginRedirect};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::future::join_all;
use session_auth::{CookieJarTokenSource, CredentialStore};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./api-probe.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Print the Prometheus exposition after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Send a request (or several concurrent copies) through the pipeline
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
        /// Send N copies concurrently
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        repeat: u16,
    },
    /// Show the signed-in user
    Whoami,
    /// End the session
    Logout,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    // stdout carries response bodies; logs go to stderr.
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Install before any metrics are emitted
    let prometheus = cli.metrics.then(metrics::install_recorder);

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        persisted = config.auth.credentials_file.is_some(),
        "configuration loaded"
    );

    let (client, mut redirects) = build_client(&config).await?;
    let outcome = run(&client, &config, cli.command).await;

    drain_redirects(&mut redirects);
    if let Some(handle) = prometheus {
        println!("{}", handle.render());
    }

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

async fn build_client(
    config: &Config,
) -> Result<(AuthenticatedClient, UnboundedReceiver<LoginRedirect>)> {
    let transport = Arc::new(
        ReqwestTransport::new(&config.api.base_url, config.api.timeout())
            .context("failed to build HTTP transport")?,
    );
    let anti_forgery = Arc::new(CookieJarTokenSource::for_transport(&transport));

    let credentials = match &config.auth.credentials_file {
        Some(path) => CredentialStore::load(path.clone())
            .await
            .with_context(|| format!("failed to load session from {}", path.display()))?,
        None => CredentialStore::in_memory(),
    };

    let (navigator, redirects) = ChannelNavigator::new();
    let client = AuthenticatedClient::new(
        transport,
        Arc::new(credentials),
        anti_forgery,
        Arc::new(navigator),
        config.auth.endpoints.clone(),
    );
    Ok((client, redirects))
}

async fn run(client: &AuthenticatedClient, config: &Config, command: Command) -> error::Result<()> {
    match command {
        Command::Request {
            method,
            path,
            data,
            repeat,
        } => {
            ensure_signed_in(client, config).await?;
            let request = build_request(&method, &path, data.as_deref())?;
            send_repeated(client, request, repeat).await
        }
        Command::Whoami => {
            ensure_signed_in(client, config).await?;
            let user = client.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Logout => {
            client.logout().await?;
            println!("signed out");
            Ok(())
        }
    }
}

/// Sign in if the store holds no token and a username/password is configured.
async fn ensure_signed_in(client: &AuthenticatedClient, config: &Config) -> error::Result<()> {
    if client.credentials().is_authenticated().await {
        return Ok(());
    }
    match config.auth.login() {
        Some((username, password)) => {
            let user = client.login(username, password).await?;
            info!(user = %user.username, "signed in");
        }
        None => warn!("no session and no username/password configured, sending unauthenticated"),
    }
    Ok(())
}

fn build_request(method: &str, path: &str, data: Option<&str>) -> error::Result<ApiRequest> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| error::Error::InvalidMethod(method.to_owned()))?;
    let request = ApiRequest::new(method, path);
    match data {
        Some(data) => {
            let body: serde_json::Value = serde_json::from_str(data)
                .map_err(|e| error::Error::InvalidData(e.to_string()))?;
            request
                .json(&body)
                .map_err(|e| error::Error::InvalidData(e.to_string()))
        }
        None => Ok(request),
    }
}

/// Send `repeat` copies concurrently and print each result.
///
/// Returns the first failure; a session end takes precedence so the exit
/// code reflects it.
async fn send_repeated(
    client: &AuthenticatedClient,
    request: ApiRequest,
    repeat: u16,
) -> error::Result<()> {
    let sends = (0..repeat).map(|_| client.send(request.clone()));
    let mut failure: Option<error::Error> = None;

    for (i, result) in join_all(sends).await.into_iter().enumerate() {
        match result {
            Ok(response) => println!("[{i}] {} {}", response.status, response.text()),
            Err(e) => {
                eprintln!("[{i}] error: {e}");
                let e = error::Error::from(e);
                let replace = match &failure {
                    None => true,
                    Some(current) => {
                        current.exit_code() != error::SESSION_ENDED_EXIT_CODE
                            && e.exit_code() == error::SESSION_ENDED_EXIT_CODE
                    }
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
    }

    failure.map_or(Ok(()), Err)
}

fn drain_redirects(redirects: &mut UnboundedReceiver<LoginRedirect>) {
    while let Ok(redirect) = redirects.try_recv() {
        warn!(route = %redirect.route, reason = %redirect.reason, "login required");
        eprintln!(
            "session ended ({}): sign in again ({})",
            redirect.reason, redirect.route
        );
    }
}
