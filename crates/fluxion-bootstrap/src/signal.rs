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

//! One-shot broadcast signal
//!
//! A [`SyncSignal`] starts unset, can be fired exactly once with a value and never resets.
//! Any number of tasks may wait on it; waiters arriving after the signal fired return
//! immediately with the recorded value.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct SyncSignal<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> SyncSignal<T> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Records `value` and wakes every waiter. Only the first call has an effect; returns
    /// whether this call fired the signal.
    pub fn fire(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Value the signal fired with, if it did.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Waits until the signal fires.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close while we wait.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Waits until the signal fires or `timeout` elapses, whichever comes first.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl<T: Clone> Default for SyncSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}
