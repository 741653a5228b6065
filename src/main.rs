mod broker;
mod cli;
mod config;
mod ecs;
mod error;
mod explorer;
mod input;
mod launcher;
mod model;
mod orchestrator;
mod select;
mod terminal;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::{Context, Result};
use broker::{SessionManagerPlugin, SignalInterrupts};
use clap::Parser;
use cli::{CliArgs, DEFAULT_LOG_FILTER};
use config::RuntimeConfig;
use ecs::{ControlPlane, EcsGateway};
use error::ShellError;
use explorer::Explorer;
use launcher::Launcher;
use orchestrator::{Orchestrator, Outcome};
use select::Selector;
use std::error::Error as StdError;
use std::process::ExitCode;
use std::sync::Arc;
use terminal::{CrosstermKeys, CrosstermTerminal};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use ui::TerminalSink;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(&args).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(error) => {
            report(&error, &args.profile);
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(args: &CliArgs) -> Result<Outcome, ShellError> {
    let config = RuntimeConfig::discover().map_err(|source| ShellError::Config { source })?;
    let filter = if args.log_filter == DEFAULT_LOG_FILTER {
        config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    } else {
        args.log_filter.as_str()
    };
    init_tracing(filter).map_err(|source| ShellError::Config { source })?;
    if let Some(source) = &config.source {
        debug!(source, "loaded runtime config");
    }

    let interrupts =
        SignalInterrupts::install().map_err(|source| ShellError::Config { source })?;
    let gateway = EcsGateway::connect(&args.profile, config.region.as_deref(), &config.shell)
        .await
        .map_err(|source| ShellError::Config { source })?;
    let context = gateway.session_context().clone();
    let control_plane: Arc<dyn ControlPlane> = Arc::new(gateway);

    let selector = Selector::new(
        Box::new(CrosstermKeys),
        Box::new(TerminalSink::stdout()),
        Box::new(CrosstermTerminal),
        config.page_size,
    );
    let launcher = Launcher::new(
        control_plane.clone(),
        Box::new(SessionManagerPlugin::new(config.broker_binary.as_str())),
        context,
    );

    let mut orchestrator = Orchestrator::new(
        Explorer::new(control_plane),
        selector,
        launcher,
        Box::new(interrupts),
    );
    orchestrator.run(&args.cluster).await
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn report(error: &ShellError, profile: &str) {
    eprintln!("error: {}", compact_error(error));
    if error.is_credential_failure() {
        eprintln!();
        eprintln!("AWS credentials could not be retrieved; the session may have expired.");
        eprintln!("  configure SSO:  aws configure sso");
        eprintln!("  renew a login:  aws sso login --profile {profile}");
    }
}

fn compact_error(error: &(dyn StdError + 'static)) -> String {
    let mut out = vec![error.to_string()];
    let mut next = error.source();
    while let Some(cause) = next {
        if out.len() > 2 {
            break;
        }
        out.push(format!("caused by: {cause}"));
        next = cause.source();
    }

    out.join("\n")
}
