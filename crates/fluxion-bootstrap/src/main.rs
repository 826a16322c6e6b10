// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! FluxION Bootstrap - Entry point for the bootstrap binary
//!
//! Makes sure an up-to-date FluxION payload is installed in the working directory, then
//! starts it and exits with its exit code.

use clap::Parser;
use fluxion_bootstrap::config::load_config;
use fluxion_bootstrap::payload::prepare_work_dir;
use fluxion_bootstrap::proxy::DEFAULT_PROXY_PORT;
use fluxion_bootstrap::{
    BootstrapError, LaunchContext, LogSink, ProxyConfig, TracingSink, UpdateCoordinator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "fluxion-bootstrap",
    version,
    about = "Downloads, verifies and starts FluxION",
    after_help = "Unrecognized arguments are passed to FluxION unchanged. Use '--' to pass \
                  arguments that clash with the options above."
)]
struct Cli {
    /// Download the payload even if one is installed
    #[arg(long)]
    force: bool,

    /// SOCKS proxy host
    #[arg(long)]
    proxy_host: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    proxy_port: u16,

    #[arg(long)]
    proxy_user: Option<String>,

    #[arg(long)]
    proxy_pass: Option<String>,

    /// Working directory holding the payload
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Arguments handed to FluxION unchanged, starting at the first unrecognized one
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    passthrough: Vec<String>,
}

fn default_work_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".fluxion"), |dir| dir.join("fluxion"))
}

/// Appends the fatal error with its cause chain and the remediation hint to the console.
fn report_fatal(log: &dyn LogSink, err: BootstrapError) {
    let remediation = err.remediation();
    log.append(&format!("FATAL ERROR: {:?}", anyhow::Error::new(err)));
    log.append(&format!("\n{remediation}"));
}

async fn run(cli: Cli, log: Arc<dyn LogSink>) -> Result<ExitCode, BootstrapError> {
    let work_dir = cli.workdir.unwrap_or_else(default_work_dir);
    prepare_work_dir(&work_dir)?;
    log.append(&format!("Working directory: {}", work_dir.display()));

    let config = load_config(&work_dir)?;
    let proxy = ProxyConfig::from_parts(
        cli.proxy_host,
        cli.proxy_port,
        cli.proxy_user,
        cli.proxy_pass,
    );
    if let Some(proxy) = &proxy {
        log.append(&format!("Using proxy {}", proxy.url()));
    }

    let launch = LaunchContext::new(work_dir, proxy, cli.passthrough);
    let coordinator = UpdateCoordinator::new(config, launch, Arc::clone(&log))?;
    let status = coordinator.execute(cli.force).await?;

    tracing::info!("FluxION exited with {status}");
    Ok(status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let log: Arc<dyn LogSink> = Arc::new(TracingSink);
    log.append("Bootstrap started");

    match run(cli, Arc::clone(&log)).await {
        Ok(code) => code,
        Err(err) => {
            report_fatal(log.as_ref(), err);
            ExitCode::FAILURE
        }
    }
}
