//! End-to-end install pipeline tests
//!
//! A mock manifest + package endpoint serves a real ZIP archive; the
//! full pipeline runs against a temp filesystem.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use plugget_archive::{CompressionMethod, ZipWriter};
use plugget_auth::{AuthProvider, Credential, CredentialStore};
use plugget_errors::{Error, InstallError, ManifestError, NetworkError};
use plugget_events::{AppEvent, EventReceiver, InstallEvent};
use plugget_install::{InstallConfig, InstallManager};
use plugget_types::{CancelFlag, PluginId};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct TestProvider {
    refresh_calls: AtomicUsize,
}

#[async_trait]
impl AuthProvider for TestProvider {
    async fn login(&self) -> Result<Credential, Error> {
        Ok(Credential::new(
            "fresh-token",
            Utc::now() + Duration::hours(1),
            "refresh-token",
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Credential, Error> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(
            "fresh-token",
            Utc::now() + Duration::hours(1),
            "refresh-token",
        ))
    }
}

struct Harness {
    manager: Arc<InstallManager>,
    provider: Arc<TestProvider>,
    credentials: Arc<CredentialStore>,
    rx: EventReceiver,
    temp: TempDir,
}

impl Harness {
    async fn new(server: &MockServer, access_token: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(TestProvider {
            refresh_calls: AtomicUsize::new(0),
        });
        let credentials = Arc::new(CredentialStore::new(provider.clone()));
        credentials
            .adopt(Credential::new(
                access_token,
                Utc::now() + Duration::hours(1),
                "refresh-token",
            ))
            .await;

        let (tx, rx) = plugget_events::channel();
        let config = InstallConfig::new(
            temp.path().join("plugins"),
            temp.path().join("work"),
            "5.3".parse().unwrap(),
            server.url("/manifest.json"),
        );
        let manager = Arc::new(InstallManager::new(config, credentials.clone(), tx).unwrap());
        manager.startup().await.unwrap();

        Self {
            manager,
            provider,
            credentials,
            rx,
            temp,
        }
    }

    fn plugin_dir(&self, id: &str) -> std::path::PathBuf {
        self.temp.path().join("plugins").join(id)
    }

    fn work_entries(&self, sub: &str) -> usize {
        std::fs::read_dir(self.temp.path().join("work").join(sub))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    fn drain_events(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn plugin_zip() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .add_file(
            "DemoPlugin/plugin.json",
            br#"{"name":"Demo Plugin"}"#,
            CompressionMethod::Deflate,
            None,
        )
        .unwrap();
    writer
        .add_file(
            "DemoPlugin/Source/demo.rs",
            b"pub fn demo() {}\n",
            CompressionMethod::Deflate,
            None,
        )
        .unwrap();
    writer.finish().unwrap().into_inner()
}

fn digest_of(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

fn manifest_json(server: &MockServer, checksum: &str, min: &str, max: &str) -> String {
    format!(
        r#"[{{
            "identifier": "demo",
            "name": "Demo Plugin",
            "version": "1.4.0",
            "url": "{}",
            "checksum": "{checksum}",
            "minVersion": "{min}",
            "maxVersion": "{max}"
        }}]"#,
        server.url("/packages/demo.zip")
    )
}

fn mount_manifest(server: &MockServer, body: String) {
    server.mock(|when, then| {
        when.method(GET).path("/manifest.json");
        then.status(200).body(body);
    });
}

#[tokio::test]
async fn full_install_pipeline() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    let package_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/packages/demo.zip")
            .header("authorization", "Bearer fresh-token");
        then.status(200).body(&archive);
    });

    let mut harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("demo").unwrap();

    let record = harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(record.version, "1.4.0");
    assert_eq!(record.path, harness.plugin_dir("demo"));
    package_mock.assert();

    // Shared root flattened, full tree extracted
    assert!(harness.plugin_dir("demo").join("plugin.json").is_file());
    assert!(harness.plugin_dir("demo").join("Source/demo.rs").is_file());

    // Record is the durable truth
    let installed = harness.manager.installed().await.unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0], record);

    // No staging or temp artifacts survive
    assert_eq!(harness.work_entries("staging"), 0);
    assert_eq!(harness.work_entries("downloads"), 0);

    let events = harness.drain_events();
    let phases: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Install(InstallEvent::Queued { .. }) => Some("queued"),
            AppEvent::Install(InstallEvent::Extracting { .. }) => Some("extracting"),
            AppEvent::Install(InstallEvent::Installed { .. }) => Some("installed"),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec!["queued", "extracting", "installed"]);
}

#[tokio::test]
async fn checksum_mismatch_leaves_previous_install_untouched() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("demo").unwrap();
    let first = harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();

    // Same endpoint now declares a checksum the served bytes won't match
    let server2 = MockServer::start();
    mount_manifest(
        &server2,
        format!(
            r#"[{{
                "identifier": "demo",
                "name": "Demo Plugin",
                "version": "2.0.0",
                "url": "{}",
                "checksum": "{}",
                "minVersion": "5.0",
                "maxVersion": "5.4"
            }}]"#,
            server2.url("/packages/demo.zip"),
            digest_of(b"what the server should have sent")
        ),
    );
    server2.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(b"tampered bytes");
    });

    let harness2 = Harness::new(&server2, "fresh-token").await;
    // Seed harness2's plugin root with the good install
    let src = harness.plugin_dir("demo");
    let dst = harness2.plugin_dir("demo");
    copy_tree(&src, &dst);

    let err = harness2
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Network(NetworkError::ChecksumMismatch { .. })
    ));

    // Previous install untouched, no staging residue
    assert!(dst.join("plugin.json").is_file());
    let installed = harness2.manager.installed().await.unwrap();
    assert_eq!(installed[0].version, first.version);
    assert_eq!(harness2.work_entries("staging"), 0);
    assert_eq!(harness2.work_entries("downloads"), 0);
}

#[tokio::test]
async fn concurrent_installs_single_flight() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    let package_mock = server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200)
            .delay(std::time::Duration::from_millis(300))
            .body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let manager = harness.manager.clone();
    let id = PluginId::new("demo").unwrap();

    let first = tokio::spawn({
        let manager = manager.clone();
        let id = id.clone();
        async move { manager.install(&id, &CancelFlag::new()).await }
    });
    // Let the first claim the identifier and start downloading
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let second = manager.install(&id, &CancelFlag::new()).await;

    assert!(matches!(
        second,
        Err(Error::Install(InstallError::AlreadyInProgress { .. }))
    ));
    assert!(first.await.unwrap().is_ok());

    // Exactly one actual transfer
    assert_eq!(package_mock.hits(), 1);
}

#[tokio::test]
async fn rejected_token_triggers_one_refresh_cycle() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));

    let rejected_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/packages/demo.zip")
            .header("authorization", "Bearer stale-token");
        then.status(401);
    });
    let accepted_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/packages/demo.zip")
            .header("authorization", "Bearer fresh-token");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "stale-token").await;
    let id = PluginId::new("demo").unwrap();

    harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();

    // Exactly one rejection, one refresh, one successful retry
    assert_eq!(rejected_mock.hits(), 1);
    assert_eq!(accepted_mock.hits(), 1);
    assert_eq!(harness.provider.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_credential_surfaces_auth_required() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    let package_mock = server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    harness.credentials.logout().await;

    let id = PluginId::new("demo").unwrap();
    let err = harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(plugget_errors::AuthError::Required)
    ));
    assert_eq!(package_mock.hits(), 0);

    // After an interactive login, the retry succeeds
    harness.credentials.login().await.unwrap();
    harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn incompatible_version_never_downloads() {
    let server = MockServer::start();
    let archive = plugin_zip();
    // Host 5.3 is outside [5.4, 5.6]
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.4", "5.6"));
    let package_mock = server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("demo").unwrap();
    let err = harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Install(InstallError::IncompatibleVersion { .. })
    ));
    assert_eq!(package_mock.hits(), 0);
    assert!(harness.manager.installed().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_plugin_is_reported() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));

    let harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("nonexistent").unwrap();
    let err = harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Manifest(ManifestError::UnknownPlugin { .. })
    ));
}

#[tokio::test]
async fn cancelled_install_cleans_up_and_releases_the_identifier() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200)
            .delay(std::time::Duration::from_millis(300))
            .body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let manager = harness.manager.clone();
    let id = PluginId::new("demo").unwrap();

    let cancel = CancelFlag::new();
    let task = tokio::spawn({
        let manager = manager.clone();
        let id = id.clone();
        let cancel = cancel.clone();
        async move { manager.install(&id, &cancel).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    // Temp file gone, identifier free again: a fresh attempt works
    assert_eq!(harness.work_entries("downloads"), 0);
    assert_eq!(harness.work_entries("staging"), 0);
    manager.install(&id, &CancelFlag::new()).await.unwrap();
}

#[tokio::test]
async fn reinstall_after_uninstall_hits_download_cache() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    let package_mock = server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("demo").unwrap();

    harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();
    harness.manager.uninstall(&id).await.unwrap();
    assert!(harness.manager.installed().await.unwrap().is_empty());
    assert!(!harness.plugin_dir("demo").exists());

    harness
        .manager
        .install(&id, &CancelFlag::new())
        .await
        .unwrap();

    // Second install came from the checksum-keyed cache
    assert_eq!(package_mock.hits(), 1);
    assert!(harness.plugin_dir("demo").join("plugin.json").is_file());
}

#[tokio::test]
async fn live_directory_is_never_partially_visible() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));
    server.mock(|when, then| {
        when.method(GET).path("/packages/demo.zip");
        then.status(200).body(&archive);
    });

    let harness = Harness::new(&server, "fresh-token").await;
    let manager = harness.manager.clone();
    let id = PluginId::new("demo").unwrap();
    manager.install(&id, &CancelFlag::new()).await.unwrap();

    // A reader polling during reinstalls must only ever observe the
    // complete plugin (or, briefly, no directory at all during the
    // swap) - never partial content and never a file without its
    // record.
    let plugin_dir = harness.plugin_dir("demo");
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let poller = tokio::spawn({
        let stop = stop.clone();
        let plugin_dir = plugin_dir.clone();
        async move {
            while !stop.load(Ordering::SeqCst) {
                if let Ok(content) = std::fs::read_to_string(plugin_dir.join("plugin.json")) {
                    assert_eq!(content, r#"{"name":"Demo Plugin"}"#);
                }
                tokio::task::yield_now().await;
            }
        }
    });

    for _ in 0..5 {
        manager.install(&id, &CancelFlag::new()).await.unwrap();
    }

    stop.store(true, Ordering::SeqCst);
    poller.await.unwrap();
}

#[tokio::test]
async fn uninstalling_a_plugin_that_is_not_installed_fails() {
    let server = MockServer::start();
    let archive = plugin_zip();
    mount_manifest(&server, manifest_json(&server, &digest_of(&archive), "5.0", "5.4"));

    let harness = Harness::new(&server, "fresh-token").await;
    let id = PluginId::new("demo").unwrap();
    let err = harness.manager.uninstall(&id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::NotInstalled { .. })
    ));
}

fn copy_tree(src: &std::path::Path, dst: &std::path::Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}
