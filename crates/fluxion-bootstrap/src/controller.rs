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

//! Shared state between the update coordinator and a fetch worker

use crate::signal::SyncSignal;
use std::time::Duration;

/// Completion signals for one update check.
///
/// `found` fires once with the outcome of the check. `complete` fires only after a verified
/// payload was staged, and only after `found` fired `true`. A controller is used for a single
/// coordinator invocation.
#[derive(Debug, Default)]
pub struct FetchController {
    found: SyncSignal<bool>,
    complete: SyncSignal<()>,
}

impl FetchController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The server had nothing newer for us.
    pub fn report_no_update(&self) {
        if !self.found.fire(false) {
            tracing::debug!("found signal already set, ignoring no-update report");
        }
    }

    /// A verified payload is staged: fires `found(true)` and then `complete`.
    pub fn report_downloaded(&self) {
        self.found.fire(true);
        if self.found.peek() == Some(true) {
            self.complete.fire(());
        } else {
            tracing::warn!("download reported after a no-update outcome, not marking complete");
        }
    }

    /// Waits at most `deadline` for the outcome of the check.
    pub async fn wait_found(&self, deadline: Duration) -> Option<bool> {
        self.found.wait_timeout(deadline).await
    }

    pub async fn wait_complete(&self) {
        self.complete.wait().await;
    }

    #[must_use]
    pub fn found(&self) -> Option<bool> {
        self.found.peek()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.is_fired()
    }
}
