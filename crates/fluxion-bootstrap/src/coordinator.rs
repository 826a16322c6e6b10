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

//! Update coordinator: decides how the payload is obtained, installs it and hands off

use crate::config::BootstrapConfig;
use crate::controller::FetchController;
use crate::decoder::{Decoder, decoder_for};
use crate::digest::installed_validator;
use crate::error::{BootstrapError, Result};
use crate::fetcher::{FetchWorker, build_client};
use crate::launcher::{LaunchContext, LaunchTarget, ProcessLauncher};
use crate::log_sink::LogSink;
use crate::payload::PayloadLocation;
use crate::stager::{InstallStager, Promotion};
use reqwest::Client;
use std::process::ExitStatus;
use std::sync::Arc;

/// Which way the update phase went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// A download left behind by an earlier run was installed, no network access
    PromotedLeftover,
    /// Forced or first install, downloaded synchronously
    Downloaded,
    /// The background check found an update before the deadline
    Updated,
    NoUpdate,
    /// Launching the installed payload; the background download keeps running
    DeadlineElapsed,
}

#[derive(Debug)]
pub struct UpdateCoordinator {
    config: BootstrapConfig,
    location: PayloadLocation,
    client: Client,
    log: Arc<dyn LogSink>,
    stager: InstallStager,
    decoder: Box<dyn Decoder>,
    launcher: Box<dyn LaunchTarget>,
    launch: LaunchContext,
}

impl UpdateCoordinator {
    pub fn new(
        config: BootstrapConfig,
        launch: LaunchContext,
        log: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let location = PayloadLocation::new(&launch.work_dir, &config);
        let client = build_client(&config, launch.proxy.as_ref(), log.as_ref())?;
        Ok(Self {
            decoder: decoder_for(config.format),
            launcher: Box::new(ProcessLauncher),
            stager: InstallStager::new(Arc::clone(&log)),
            config,
            location,
            client,
            log,
            launch,
        })
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Box<dyn LaunchTarget>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn location(&self) -> &PayloadLocation {
        &self.location
    }

    /// Updates if needed, decodes the installed payload and runs it.
    pub async fn execute(&self, force: bool) -> Result<ExitStatus> {
        let decision = self.update(force).await?;
        tracing::debug!("Update phase finished: {decision:?}");

        self.decoder
            .decode(&self.location.installed, &self.location.decoded)?;
        self.log.append("Starting FluxION");
        self.launcher
            .launch(&self.location.decoded, &self.launch)
            .await
    }

    /// Makes sure a verified payload is installed.
    pub async fn update(&self, force: bool) -> Result<UpdateDecision> {
        if self.location.leftover.is_file() {
            self.log.append("Found cached update");
            self.promote()?;
            return Ok(UpdateDecision::PromotedLeftover);
        }

        if force || !self.location.installed.exists() {
            let controller = Arc::new(FetchController::new());
            self.worker(Arc::clone(&controller)).run().await;
            if !controller.is_complete() {
                return Err(BootstrapError::ForcedFetchFailed);
            }
            self.promote()?;
            return Ok(UpdateDecision::Downloaded);
        }

        let validator = installed_validator(self.config.digest, &self.location.installed);
        let controller = Arc::new(FetchController::new());
        let worker = self
            .worker(Arc::clone(&controller))
            .with_validator(validator);
        tokio::spawn(async move { worker.run().await });

        self.log.append("Looking for update");
        match controller.wait_found(self.config.update_deadline()).await {
            Some(true) => {
                self.log.append("Found update in time, waiting to download");
                controller.wait_complete().await;
                self.promote()?;
                Ok(UpdateDecision::Updated)
            }
            Some(false) => Ok(UpdateDecision::NoUpdate),
            None => {
                self.log.append("Didn't find an update in time.");
                Ok(UpdateDecision::DeadlineElapsed)
            }
        }
    }

    fn worker(&self, controller: Arc<FetchController>) -> FetchWorker {
        FetchWorker::new(
            self.client.clone(),
            &self.config,
            &self.location,
            controller,
            Arc::clone(&self.log),
        )
    }

    fn promote(&self) -> Result<Promotion> {
        self.stager
            .promote(&self.location.leftover, &self.location.installed)
    }
}
