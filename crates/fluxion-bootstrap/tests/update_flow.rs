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

//! End-to-end update scenarios against a mock payload server

#[cfg(unix)]
use async_trait::async_trait;
use fluxion_bootstrap::digest::hash_bytes;
use fluxion_bootstrap::{
    BootstrapConfig, BootstrapError, DigestAlgorithm, LaunchContext, LaunchTarget, MemorySink,
    PayloadFormat, UpdateCoordinator, UpdateDecision,
};
use mockito::{Matcher, Server};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const OLD_PAYLOAD: &[u8] = b"fluxion payload v1";
const NEW_PAYLOAD: &[u8] = b"fluxion payload v2 with more features";

fn md5(body: &[u8]) -> String {
    hash_bytes(DigestAlgorithm::Md5, body)
}

fn etag(body: &[u8]) -> String {
    format!("\"{}\"", md5(body))
}

fn config(url: String) -> BootstrapConfig {
    BootstrapConfig {
        payload_url: url,
        format: PayloadFormat::Raw,
        connect_timeout_secs: 2,
        read_timeout_secs: 5,
        ..BootstrapConfig::default()
    }
}

fn coordinator(dir: &Path, config: BootstrapConfig, log: &Arc<MemorySink>) -> UpdateCoordinator {
    let launch = LaunchContext::new(dir.to_path_buf(), None, Vec::new());
    UpdateCoordinator::new(config, launch, log.clone()).unwrap()
}

#[tokio::test]
async fn test_leftover_is_promoted_without_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();
    std::fs::write(&location.leftover, NEW_PAYLOAD).unwrap();

    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::PromotedLeftover);
    assert_eq!(std::fs::read(&location.installed).unwrap(), NEW_PAYLOAD);
    assert!(!location.leftover.exists());
    assert!(log.contains("Found cached update"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_race_installs_update_found_in_time() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .match_header("if-none-match", md5(OLD_PAYLOAD).as_str())
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_body(NEW_PAYLOAD)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();

    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::Updated);
    assert_eq!(std::fs::read(&location.installed).unwrap(), NEW_PAYLOAD);
    assert!(!location.leftover.exists());
    assert!(!location.staging.exists());
    assert!(log.contains("Found update in time, waiting to download"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_race_keeps_installed_when_not_modified() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();

    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::NoUpdate);
    assert_eq!(std::fs::read(&location.installed).unwrap(), OLD_PAYLOAD);
    assert!(!location.leftover.exists());
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_elapses_and_download_lands_for_next_run() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(800));
            writer.write_all(NEW_PAYLOAD)
        })
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        BootstrapConfig {
            update_deadline_ms: 100,
            ..config(format!("{}/fluxion.lzma", server.url()))
        },
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();

    let started = Instant::now();
    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::DeadlineElapsed);
    assert!(started.elapsed() < Duration::from_millis(700));
    assert_eq!(std::fs::read(&location.installed).unwrap(), OLD_PAYLOAD);
    assert!(log.contains("Didn't find an update in time."));

    // The background download was not cancelled and stages the payload.
    for _ in 0..100 {
        if location.leftover.is_file() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(std::fs::read(&location.leftover).unwrap(), NEW_PAYLOAD);

    // Next run installs it without touching the network.
    let decision = coordinator.update(false).await.unwrap();
    assert_eq!(decision, UpdateDecision::PromotedLeftover);
    assert_eq!(std::fs::read(&location.installed).unwrap(), NEW_PAYLOAD);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_forced_download_retries_after_hash_mismatch() {
    let mut server = Server::new_async().await;
    let corrupt = server
        .mock("GET", "/fluxion.lzma")
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_body("fluxion payload v2 with")
        .expect(1)
        .create_async()
        .await;
    let good = server
        .mock("GET", "/fluxion.lzma")
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_body(NEW_PAYLOAD)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();

    let decision = coordinator.update(true).await.unwrap();

    assert_eq!(decision, UpdateDecision::Downloaded);
    assert_eq!(std::fs::read(&location.installed).unwrap(), NEW_PAYLOAD);
    assert!(log.contains("After downloading, the hash didn't match. Retrying"));
    corrupt.assert_async().await;
    good.assert_async().await;
}

#[tokio::test]
async fn test_forced_download_exhaustion_is_fatal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_body("garbage")
        .expect(3)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        BootstrapConfig {
            max_retries: 3,
            ..config(format!("{}/fluxion.lzma", server.url()))
        },
        &log,
    );
    let location = coordinator.location().clone();
    std::fs::write(&location.installed, OLD_PAYLOAD).unwrap();

    let err = coordinator.update(true).await.unwrap_err();

    assert!(matches!(err, BootstrapError::ForcedFetchFailed));
    assert_eq!(std::fs::read(&location.installed).unwrap(), OLD_PAYLOAD);
    assert!(!location.leftover.exists());
    assert!(!location.staging.exists());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_first_install_without_update_is_fatal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );

    let err = coordinator.update(false).await.unwrap_err();

    assert!(matches!(err, BootstrapError::ForcedFetchFailed));
    assert!(!coordinator.location().installed.exists());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_errors_retried_until_success() {
    let mut server = Server::new_async().await;
    let missing = server
        .mock("GET", "/fluxion.lzma")
        .with_status(404)
        .expect(3)
        .create_async()
        .await;
    let found = server
        .mock("GET", "/fluxion.lzma")
        .with_status(200)
        .with_header("etag", &etag(NEW_PAYLOAD))
        .with_body(NEW_PAYLOAD)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );

    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::Downloaded);
    assert_eq!(
        std::fs::read(&coordinator.location().installed).unwrap(),
        NEW_PAYLOAD
    );
    assert!(log.contains("(try 4/10)"));
    missing.assert_async().await;
    found.assert_async().await;
}

#[tokio::test]
async fn test_uppercase_etag_matches() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .match_header("if-none-match", Matcher::Missing)
        .with_status(200)
        .with_header(
            "etag",
            &format!("\"{}\"", md5(NEW_PAYLOAD).to_ascii_uppercase()),
        )
        .with_body(NEW_PAYLOAD)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let coordinator = coordinator(
        dir.path(),
        config(format!("{}/fluxion.lzma", server.url())),
        &log,
    );

    let decision = coordinator.update(false).await.unwrap();

    assert_eq!(decision, UpdateDecision::Downloaded);
    assert!(!log.contains("the hash didn't match"));
    mock.assert_async().await;
}

#[cfg(unix)]
#[derive(Debug, Default, Clone)]
struct RecordingLauncher {
    launched: Arc<parking_lot::Mutex<Option<(Vec<u8>, LaunchContext)>>>,
}

#[cfg(unix)]
#[async_trait]
impl LaunchTarget for RecordingLauncher {
    async fn launch(
        &self,
        entry: &Path,
        ctx: &LaunchContext,
    ) -> fluxion_bootstrap::error::Result<std::process::ExitStatus> {
        use std::os::unix::process::ExitStatusExt;
        let content = std::fs::read(entry).unwrap();
        *self.launched.lock() = Some((content, ctx.clone()));
        Ok(std::process::ExitStatus::from_raw(0))
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_decodes_and_hands_off() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fluxion.lzma")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let log = Arc::new(MemorySink::new());
    let launcher = RecordingLauncher::default();
    let launch = LaunchContext::new(dir.path().to_path_buf(), None, vec!["--demo".to_string()]);
    let coordinator = UpdateCoordinator::new(
        config(format!("{}/fluxion.lzma", server.url())),
        launch,
        log.clone(),
    )
    .unwrap()
    .with_launcher(Box::new(launcher.clone()));
    std::fs::write(&coordinator.location().installed, OLD_PAYLOAD).unwrap();

    let status = coordinator.execute(false).await.unwrap();

    assert!(status.success());
    let (content, ctx) = launcher.launched.lock().take().unwrap();
    assert_eq!(content, OLD_PAYLOAD);
    assert_eq!(ctx.passthrough, vec!["--demo"]);
    assert_eq!(ctx.bootstrap_version, fluxion_bootstrap::BOOTSTRAP_VERSION);
    assert_eq!(ctx.work_dir, dir.path());
    assert!(log.contains("Starting FluxION"));
    mock.assert_async().await;
}
