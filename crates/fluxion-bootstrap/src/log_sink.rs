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

//! Console the bootstrap reports its progress to

use parking_lot::Mutex;

/// Append-only text console.
pub trait LogSink: Send + Sync + std::fmt::Debug {
    fn append(&self, line: &str);
}

/// Forwards every line to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, line: &str) {
        tracing::info!(target: "fluxion_bootstrap::console", "{line}");
    }
}

/// Keeps lines in memory, for embedding UIs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
