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

//! Hand-off to the next stage

use crate::error::{BootstrapError, Result};
use crate::proxy::ProxyConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

/// Protocol number the launched payload uses to recognise what this bootstrap supports.
pub const BOOTSTRAP_VERSION: u32 = 4;

/// Environment variable carrying the proxy password, kept off the command line.
pub const PROXY_PASSWORD_ENV: &str = "FLUXION_PROXY_PASS";

/// Everything the next stage receives from the bootstrap.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub work_dir: PathBuf,
    pub proxy: Option<ProxyConfig>,
    pub passthrough: Vec<String>,
    pub bootstrap_version: u32,
}

impl LaunchContext {
    #[must_use]
    pub fn new(work_dir: PathBuf, proxy: Option<ProxyConfig>, passthrough: Vec<String>) -> Self {
        Self {
            work_dir,
            proxy,
            passthrough,
            bootstrap_version: BOOTSTRAP_VERSION,
        }
    }
}

#[async_trait]
pub trait LaunchTarget: Send + Sync + std::fmt::Debug {
    /// Starts the decoded payload and returns once it exits.
    async fn launch(&self, entry: &Path, ctx: &LaunchContext) -> Result<ExitStatus>;
}

/// Runs the decoded payload as a child process and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    fn command(entry: &Path, ctx: &LaunchContext) -> Command {
        let mut command = Command::new(entry);
        command
            .current_dir(&ctx.work_dir)
            .arg("--work-dir")
            .arg(&ctx.work_dir)
            .arg("--bootstrap-version")
            .arg(ctx.bootstrap_version.to_string());

        if let Some(proxy) = &ctx.proxy {
            command
                .arg("--proxy-host")
                .arg(&proxy.host)
                .arg("--proxy-port")
                .arg(proxy.port.to_string());
            if let Some(creds) = &proxy.credentials {
                command
                    .arg("--proxy-user")
                    .arg(&creds.username)
                    .env(PROXY_PASSWORD_ENV, &creds.password);
            }
        }

        if !ctx.passthrough.is_empty() {
            command.arg("--").args(&ctx.passthrough);
        }
        command
    }
}

fn make_executable(entry: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(entry)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(entry, perms)?;
    }
    #[cfg(not(unix))]
    let _ = entry;
    Ok(())
}

#[async_trait]
impl LaunchTarget for ProcessLauncher {
    async fn launch(&self, entry: &Path, ctx: &LaunchContext) -> Result<ExitStatus> {
        let launch_error = |reason: String| BootstrapError::Launch {
            path: entry.to_path_buf(),
            reason,
        };

        make_executable(entry).map_err(|e| launch_error(e.to_string()))?;

        tracing::info!(
            "Starting {} (bootstrap protocol {})",
            entry.display(),
            ctx.bootstrap_version
        );
        let mut child = Self::command(entry, ctx)
            .spawn()
            .map_err(|e| launch_error(e.to_string()))?;
        child.wait().await.map_err(|e| launch_error(e.to_string()))
    }
}
