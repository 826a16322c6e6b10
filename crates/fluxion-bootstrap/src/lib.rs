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

//! FluxION Bootstrap - fetches, verifies and installs the FluxION payload before launch
//!
//! On every start the bootstrap either promotes a download left behind by a previous run,
//! downloads the payload synchronously (forced or first install) or races a background
//! download against a short deadline. The installed payload is then decoded and handed to
//! the launch target.

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod decoder;
pub mod digest;
pub mod error;
pub mod fetcher;
pub mod launcher;
pub mod log_sink;
pub mod payload;
pub mod proxy;
pub mod signal;
pub mod stager;

pub use config::{BootstrapConfig, DigestAlgorithm, PayloadFormat};
pub use controller::FetchController;
pub use coordinator::{UpdateCoordinator, UpdateDecision};
pub use error::{BootstrapError, FetchError};
pub use fetcher::FetchWorker;
pub use launcher::{BOOTSTRAP_VERSION, LaunchContext, LaunchTarget, ProcessLauncher};
pub use log_sink::{LogSink, MemorySink, TracingSink};
pub use payload::PayloadLocation;
pub use proxy::{ProxyConfig, ProxyCredentials};
pub use signal::SyncSignal;
pub use stager::{InstallStager, Promotion};
