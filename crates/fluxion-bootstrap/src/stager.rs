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

//! Promotion of a staged payload to the installed location

use crate::error::{BootstrapError, Result};
use crate::log_sink::LogSink;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type RenameFn = fn(&Path, &Path) -> io::Result<()>;
type RemoveFn = fn(&Path) -> io::Result<()>;

/// How a promotion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Renamed,
    /// Rename failed, the payload was copied instead
    Copied,
    NothingStaged,
    /// Staged file disappeared before it could be copied
    Vanished,
}

#[derive(Debug)]
pub struct InstallStager {
    log: Arc<dyn LogSink>,
    rename: RenameFn,
    remove: RemoveFn,
}

fn std_rename(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

fn remove_any(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn copy_target(installed: &Path) -> PathBuf {
    let mut name = installed.as_os_str().to_owned();
    name.push(".copy");
    PathBuf::from(name)
}

impl InstallStager {
    #[must_use]
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            rename: std_rename,
            remove: remove_any,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_remove(mut self, remove: RemoveFn) -> Self {
        self.remove = remove;
        self
    }

    /// Moves `staging` onto `installed`, replacing whatever is there.
    pub fn promote(&self, staging: &Path, installed: &Path) -> Result<Promotion> {
        self.clear_non_file(installed)
            .map_err(|source| BootstrapError::CannotClearDestination {
                path: installed.to_path_buf(),
                source,
            })?;

        if !staging.is_file() {
            return Ok(Promotion::NothingStaged);
        }

        self.log.append(&format!(
            "Renaming {} to {}",
            staging.display(),
            installed.display()
        ));
        match (self.rename)(staging, installed) {
            Ok(()) => {
                self.log.append("Renamed successfully.");
                Ok(Promotion::Renamed)
            }
            Err(e) => {
                tracing::debug!("rename failed: {e}");
                if !is_writable(installed) {
                    return Err(BootstrapError::DestinationNotWritable {
                        path: installed.to_path_buf(),
                    });
                }
                self.log.append(
                    "Unable to rename - could be on another filesystem, trying copy & delete.",
                );
                self.copy_and_delete(staging, installed)
            }
        }
    }

    fn copy_and_delete(&self, staging: &Path, installed: &Path) -> Result<Promotion> {
        if !staging.is_file() {
            self.log.append("Nevermind... file vanished?");
            return Ok(Promotion::Vanished);
        }

        // Copy next to the destination first so `installed` is replaced in one rename.
        let temp = copy_target(installed);
        let copied = self
            .clear_non_file(&temp)
            .and_then(|()| std::fs::copy(staging, &temp));
        if let Err(source) = copied {
            let _ = std::fs::remove_file(&temp);
            if source.kind() == io::ErrorKind::NotFound && !staging.exists() {
                self.log.append("Nevermind... file vanished?");
                return Ok(Promotion::Vanished);
            }
            return Err(BootstrapError::CopyFailed {
                from: staging.to_path_buf(),
                to: installed.to_path_buf(),
                source,
            });
        }
        if let Err(source) = std::fs::rename(&temp, installed) {
            let _ = std::fs::remove_file(&temp);
            return Err(BootstrapError::CopyFailed {
                from: staging.to_path_buf(),
                to: installed.to_path_buf(),
                source,
            });
        }

        match std::fs::remove_file(staging) {
            Ok(()) => self.log.append("Copy & delete succeeded."),
            Err(e) => self.log.append(&format!(
                "Unable to remove {} after copy: {e}",
                staging.display()
            )),
        }
        Ok(Promotion::Copied)
    }

    /// Removes `path` when something other than a regular file sits there.
    fn clear_non_file(&self, path: &Path) -> io::Result<()> {
        if !path.exists() || path.is_file() {
            return Ok(());
        }
        (self.remove)(path)
    }
}

/// A missing file counts as writable; an existing one must be openable for writing.
fn is_writable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return true;
    };
    !meta.permissions().readonly() && OpenOptions::new().write(true).open(path).is_ok()
}
