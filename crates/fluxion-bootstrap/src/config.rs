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

//! Configuration module for the bootstrap

use crate::error::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional configuration file inside the working directory.
pub const CONFIG_FILE: &str = "bootstrap.json";

const DEFAULT_PAYLOAD_URL: &str =
    "https://fluxion-releases.s3.eu-central-1.amazonaws.com/bootstrap/fluxion.lzma";

fn default_payload_url() -> String {
    DEFAULT_PAYLOAD_URL.to_string()
}

fn default_installed_name() -> String {
    "fluxion.lzma".to_string()
}

fn default_decoded_name() -> String {
    "fluxion".to_string()
}

fn default_10() -> u32 {
    10
}

fn default_30() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    10
}

fn default_3000() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Fixed location of the payload
    #[serde(default = "default_payload_url")]
    pub payload_url: String,

    /// File name of the installed (still encoded) payload
    #[serde(default = "default_installed_name")]
    pub installed_name: String,

    /// File name of the decoded entry point
    #[serde(default = "default_decoded_name")]
    pub decoded_name: String,

    #[serde(default)]
    pub format: PayloadFormat,

    /// Hash the server publishes as the ETag
    #[serde(default)]
    pub digest: DigestAlgorithm,

    /// Download attempts per run
    #[serde(default = "default_10")]
    pub max_retries: u32,

    #[serde(default = "default_30")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// How long to wait for the background check before launching the installed payload
    #[serde(default = "default_3000")]
    pub update_deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Lzma,
    Xz,
    Gzip,
    Raw,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            payload_url: default_payload_url(),
            installed_name: default_installed_name(),
            decoded_name: default_decoded_name(),
            format: PayloadFormat::default(),
            digest: DigestAlgorithm::default(),
            max_retries: 10,
            connect_timeout_secs: 30,
            read_timeout_secs: 10,
            update_deadline_ms: 3000,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn update_deadline(&self) -> Duration {
        Duration::from_millis(self.update_deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(BootstrapError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.installed_name.trim().is_empty() || self.decoded_name.trim().is_empty() {
            return Err(BootstrapError::Config(
                "payload file names must not be empty".to_string(),
            ));
        }
        if self.installed_name == self.decoded_name {
            return Err(BootstrapError::Config(format!(
                "installed and decoded payload share the name {}",
                self.installed_name
            )));
        }
        Ok(())
    }
}

#[must_use]
pub fn config_path(work_dir: &Path) -> PathBuf {
    work_dir.join(CONFIG_FILE)
}

/// Loads `bootstrap.json` from the working directory, falling back to defaults when absent.
pub fn load_config(work_dir: &Path) -> Result<BootstrapConfig> {
    let path = config_path(work_dir);
    let config = if path.exists() {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BootstrapError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| BootstrapError::Config(format!("Failed to parse config: {e}")))?
    } else {
        BootstrapConfig::default()
    };

    config.validate()?;
    Ok(config)
}
