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

//! Payload file layout inside the working directory

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use std::path::{Path, PathBuf};

/// Where the payload lives during the different stages of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLocation {
    /// Currently usable payload, always complete and verified
    pub installed: PathBuf,
    /// In-progress download target
    pub staging: PathBuf,
    /// Verified download waiting to be promoted (possibly by a later run)
    pub leftover: PathBuf,
    /// Decoded entry point handed to the launch target
    pub decoded: PathBuf,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl PayloadLocation {
    #[must_use]
    pub fn new(work_dir: &Path, config: &BootstrapConfig) -> Self {
        let installed = work_dir.join(&config.installed_name);
        Self {
            staging: with_suffix(&installed, ".part"),
            leftover: with_suffix(&installed, ".new"),
            decoded: work_dir.join(&config.decoded_name),
            installed,
        }
    }
}

/// Makes sure `work_dir` is a usable directory, creating it when missing.
pub fn prepare_work_dir(work_dir: &Path) -> Result<()> {
    if work_dir.exists() {
        if !work_dir.is_dir() {
            return Err(BootstrapError::InvalidWorkDir {
                path: work_dir.to_path_buf(),
            });
        }
        return Ok(());
    }

    std::fs::create_dir_all(work_dir).map_err(|source| BootstrapError::CreateWorkDir {
        path: work_dir.to_path_buf(),
        source,
    })
}
