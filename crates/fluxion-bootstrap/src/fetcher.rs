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

//! Payload fetch worker: conditional download, streaming verification and bounded retry

use crate::config::{BootstrapConfig, DigestAlgorithm};
use crate::controller::FetchController;
use crate::digest::{ContentHasher, parse_validator, validator_matches};
use crate::error::{BootstrapError, FetchError, Result};
use crate::log_sink::LogSink;
use crate::payload::PayloadLocation;
use crate::proxy::ProxyConfig;
use futures_util::StreamExt;
use reqwest::header::{CACHE_CONTROL, ETAG, EXPIRES, IF_NONE_MATCH, PRAGMA};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

const USER_AGENT: &str = concat!("fluxion-bootstrap/", env!("CARGO_PKG_VERSION"));

const CONNECT_HINT: &str = "Recognized exception: the likely cause is a broken IPv4/IPv6 stack \
     or missing connectivity. Check your TCP/IP and firewall settings.";
const CERTIFICATE_HINT: &str = "Recognized exception: the likely cause is a broken set of root \
     certificates or an intercepting proxy. Check your system trust store.";
const TIMEOUT_HINT: &str = "Recognized exception: the server did not answer in time. \
     Check your internet connection/proxy settings.";

/// Builds the HTTP client used for every attempt of a run.
///
/// Redirects are not followed and idle connections are not kept, so every attempt opens a
/// fresh connection. An unusable proxy is reported and a direct connection is used instead.
pub fn build_client(
    config: &BootstrapConfig,
    proxy: Option<&ProxyConfig>,
    log: &dyn LogSink,
) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0);

    builder = match proxy.map(|p| (p, p.to_reqwest())) {
        Some((_, Ok(reqwest_proxy))) => builder.proxy(reqwest_proxy),
        Some((p, Err(e))) => {
            log.append(&format!("Ignoring unusable proxy {}: {e}", p.url()));
            builder.no_proxy()
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| BootstrapError::HttpClient(e.to_string()))
}

enum Attempt {
    Staged,
    Mismatch,
    ClientError(StatusCode),
    NoUpdate(StatusCode),
}

/// Downloads the payload into the staging file and reports through a [`FetchController`].
#[derive(Debug)]
pub struct FetchWorker {
    client: Client,
    url: String,
    digest: DigestAlgorithm,
    max_retries: u32,
    validator: Option<String>,
    staging: PathBuf,
    leftover: PathBuf,
    controller: Arc<FetchController>,
    log: Arc<dyn LogSink>,
}

impl FetchWorker {
    #[must_use]
    pub fn new(
        client: Client,
        config: &BootstrapConfig,
        location: &PayloadLocation,
        controller: Arc<FetchController>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            client,
            url: config.payload_url.clone(),
            digest: config.digest,
            max_retries: config.max_retries,
            validator: None,
            staging: location.staging.clone(),
            leftover: location.leftover.clone(),
            controller,
            log,
        }
    }

    /// Fingerprint of the installed payload, sent as `If-None-Match`.
    #[must_use]
    pub fn with_validator(mut self, validator: Option<String>) -> Self {
        self.validator = validator;
        self
    }

    /// Runs until the payload is staged, the server reports nothing new, or all attempts
    /// are used up. In the last case neither signal fires.
    pub async fn run(&self) {
        for attempt in 1..=self.max_retries {
            match self.attempt(attempt).await {
                Ok(Attempt::Staged) => {
                    self.controller.report_downloaded();
                    return;
                }
                Ok(Attempt::Mismatch) => {
                    self.log
                        .append("After downloading, the hash didn't match. Retrying");
                }
                Ok(Attempt::ClientError(status)) => {
                    // 4xx is retried on purpose, same as earlier bootstrap releases.
                    self.log.append(&format!("Remote file not found ({status})."));
                }
                Ok(Attempt::NoUpdate(status)) => {
                    tracing::debug!("Server answered {status}, keeping installed payload");
                    self.log.append("No update found.");
                    self.controller.report_no_update();
                    return;
                }
                Err(e) => {
                    self.log.append(&format!("Exception: {}", error_chain(&e)));
                    if let Some(hint) = diagnose(&e) {
                        self.log.append(hint);
                    }
                }
            }
        }

        self.discard_partial().await;
        self.log.append(
            "Unable to download remote file. Check your internet connection/proxy settings.",
        );
    }

    async fn attempt(&self, attempt: u32) -> std::result::Result<Attempt, FetchError> {
        if attempt == 1 {
            self.log.append(&format!("Downloading: {}", self.url));
        } else {
            self.log.append(&format!(
                "Downloading: {} (try {attempt}/{})",
                self.url, self.max_retries
            ));
        }

        let mut request = self
            .client
            .get(&self.url)
            .header(CACHE_CONTROL, "no-store,max-age=0,no-cache")
            .header(EXPIRES, "0")
            .header(PRAGMA, "no-cache");
        if let Some(validator) = &self.validator {
            request = request.header(IF_NONE_MATCH, validator.to_ascii_lowercase());
        }

        let started = Instant::now();
        let response = request.send().await?;
        self.log.append(&format!(
            "Got reply in: {}ms",
            started.elapsed().as_millis()
        ));

        let status = response.status();
        if status.is_success() {
            self.download(response).await
        } else if status.is_client_error() {
            Ok(Attempt::ClientError(status))
        } else {
            Ok(Attempt::NoUpdate(status))
        }
    }

    async fn download(&self, response: Response) -> std::result::Result<Attempt, FetchError> {
        let expected = parse_validator(
            response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok()),
        );

        let started = Instant::now();
        let mut file = tokio::fs::File::create(&self.staging)
            .await
            .map_err(|source| io_error(&self.staging, source))?;
        let mut hasher = ContentHasher::new(self.digest);
        let mut received: u64 = 0;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|source| io_error(&self.staging, source))?;
            received += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| io_error(&self.staging, source))?;
        file.sync_all()
            .await
            .map_err(|source| io_error(&self.staging, source))?;
        drop(file);

        self.log_throughput(received, started.elapsed());

        let actual = hasher.finalize_hex();
        match expected {
            Some(expected) if !validator_matches(&expected, &actual) => {
                tracing::debug!("Expected hash {expected}, downloaded {actual}");
                self.discard_partial().await;
                return Ok(Attempt::Mismatch);
            }
            Some(_) => {}
            None => tracing::debug!("Server sent no content hash, skipping verification"),
        }

        tokio::fs::rename(&self.staging, &self.leftover)
            .await
            .map_err(|source| io_error(&self.leftover, source))?;
        Ok(Attempt::Staged)
    }

    #[expect(clippy::cast_precision_loss)]
    fn log_throughput(&self, received: u64, elapsed: Duration) {
        let kb = received as f64 / 1024.0;
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { kb / secs } else { kb };
        self.log.append(&format!(
            "Downloaded {kb:.1}kb in {secs:.1}s at {rate:.1}kb/s"
        ));
    }

    async fn discard_partial(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Unable to remove {}: {e}", self.staging.display());
            }
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn mentions_certificate(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if message.contains("certificate") || message.contains("handshake") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Hint for failures with a well-known cause.
pub(crate) fn diagnose(err: &FetchError) -> Option<&'static str> {
    let FetchError::Request(err) = err else {
        return None;
    };
    if mentions_certificate(err) {
        Some(CERTIFICATE_HINT)
    } else if err.is_connect() {
        Some(CONNECT_HINT)
    } else if err.is_timeout() {
        Some(TIMEOUT_HINT)
    } else {
        None
    }
}
