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

//! Error types for the bootstrap crate

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort the bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid working directory: {}", path.display())]
    InvalidWorkDir { path: PathBuf },

    #[error("unable to create directory {}", path.display())]
    CreateWorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("unable to download the payload while an update was forced")]
    ForcedFetchFailed,

    #[error("target path {} is not a file and could not be deleted", path.display())]
    CannotClearDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to rename: target {} is not writable", path.display())]
    DestinationNotWritable { path: PathBuf },

    #[error("unable to copy {} to {}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("unable to start {}: {reason}", path.display())]
    Launch { path: PathBuf, reason: String },
}

impl BootstrapError {
    /// Hint printed after the fatal error report.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::ForcedFetchFailed => {
                "Check your internet connection/proxy settings and restart."
            }
            Self::DestinationNotWritable { .. } | Self::CannotClearDestination { .. } => {
                "Check the permissions of the working directory and restart."
            }
            Self::InvalidWorkDir { .. }
            | Self::CreateWorkDir { .. }
            | Self::Config(_)
            | Self::HttpClient(_)
            | Self::CopyFailed { .. }
            | Self::Decode { .. }
            | Self::Launch { .. } => "Please fix the error and restart.",
        }
    }
}

/// Failures of a single download attempt. These never leave the fetch worker: the attempt
/// is logged and retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to the payload server failed")]
    Request(#[from] reqwest::Error),

    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
