//! Install manager orchestration

use crate::gate;
use crate::inflight::InFlightTable;
use crate::record::{read_record, scan_records, write_record};
use crate::staging::{remove_dir, swap_live, sweep, unique_dir};
use chrono::Utc;
use plugget_archive::ZipArchive;
use plugget_auth::CredentialStore;
use plugget_errors::{AuthError, Error, InstallError, ManifestError, UserFacingError};
use plugget_events::{AppEvent, DownloadEvent, EventEmitter, EventSender, InstallEvent};
use plugget_manifest::{ManifestEntry, ManifestStore};
use plugget_net::{
    fetch_text, DownloadCache, DownloadConfig, Downloader, NetClient, ProgressFn,
};
use plugget_types::{CancelFlag, HostVersion, InstallRecord, PluginId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Install manager configuration
///
/// `work_dir` must live on the same filesystem as `plugin_root`; the
/// atomic swap relies on rename never degrading to copy-and-delete.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Live plugin root the editor scans
    pub plugin_root: PathBuf,
    /// Work area for staging, trash, downloads, and caches
    pub work_dir: PathBuf,
    /// The host build this editor is running
    pub host_version: HostVersion,
    /// Manifest endpoint URL
    pub manifest_url: String,
    /// Refetch the manifest when the cached copy is older than this
    pub manifest_max_age: chrono::Duration,
    pub download: DownloadConfig,
    /// Download cache budget in bytes
    pub cache_max_bytes: u64,
}

impl InstallConfig {
    #[must_use]
    pub fn new(
        plugin_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        host_version: HostVersion,
        manifest_url: impl Into<String>,
    ) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            work_dir: work_dir.into(),
            host_version,
            manifest_url: manifest_url.into(),
            manifest_max_age: chrono::Duration::minutes(15),
            download: DownloadConfig::default(),
            cache_max_bytes: DownloadCache::DEFAULT_MAX_BYTES,
        }
    }

    fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }

    fn trash_dir(&self) -> PathBuf {
        self.work_dir.join("trash")
    }

    fn downloads_dir(&self) -> PathBuf {
        self.work_dir.join("downloads")
    }

    fn cache_dir(&self) -> PathBuf {
        self.work_dir.join("cache")
    }

    fn manifest_dir(&self) -> PathBuf {
        self.work_dir.join("manifest")
    }

    fn live_dir(&self, id: &PluginId) -> PathBuf {
        self.plugin_root.join(id.as_str())
    }
}

/// The orchestrator: takes a plugin identifier and produces an
/// installed, version-compatible plugin on disk
pub struct InstallManager {
    config: InstallConfig,
    client: NetClient,
    downloader: Downloader,
    cache: DownloadCache,
    credentials: Arc<CredentialStore>,
    manifest: Mutex<ManifestStore>,
    in_flight: InFlightTable,
    tx: EventSender,
}

impl EventEmitter for InstallManager {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.tx)
    }
}

impl InstallManager {
    /// Create a new install manager
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(
        config: InstallConfig,
        credentials: Arc<CredentialStore>,
        tx: EventSender,
    ) -> Result<Self, Error> {
        let client = NetClient::with_defaults()?;
        let downloader =
            Downloader::with_events(client.clone(), config.download.clone(), tx.clone());
        let cache = DownloadCache::new(config.cache_dir(), config.cache_max_bytes);
        let manifest = Mutex::new(ManifestStore::new(config.manifest_dir()));

        Ok(Self {
            config,
            client,
            downloader,
            cache,
            credentials,
            manifest,
            in_flight: InFlightTable::new(),
            tx,
        })
    }

    /// Prepare the work area and recover from crashed prior runs
    ///
    /// Creates the directory layout, sweeps orphaned staging and trash
    /// directories, and loads the cached manifest if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem failures.
    pub async fn startup(&self) -> Result<(), Error> {
        for dir in [
            self.config.plugin_root.clone(),
            self.config.staging_dir(),
            self.config.trash_dir(),
            self.config.downloads_dir(),
        ] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::io_with_path(&e, dir.clone()))?;
        }

        let orphans = sweep(&self.config.staging_dir()).await?
            + sweep(&self.config.trash_dir()).await?
            + sweep(&self.config.downloads_dir()).await?;
        if orphans > 0 {
            self.emit_debug(format!("swept {orphans} leftover work entries"));
        }

        let mut store = self.manifest.lock().await;
        match store.load_cached().await {
            Ok(()) | Err(Error::Manifest(ManifestError::CacheMiss)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Make sure a usable manifest is loaded, refetching when stale
    ///
    /// A fetch failure is tolerated as long as a previously loaded
    /// manifest is available.
    ///
    /// # Errors
    ///
    /// Returns an error if no manifest can be obtained at all, or the
    /// fetched document is invalid.
    pub async fn ensure_manifest(&self, force: bool) -> Result<(), Error> {
        let mut store = self.manifest.lock().await;
        if !force && !store.is_stale(self.config.manifest_max_age) {
            return Ok(());
        }

        match fetch_text(&self.client, &self.config.manifest_url).await {
            Ok(json) => store.update(&json).await,
            Err(e) if store.manifest().is_some() && !force => {
                self.emit_warning(format!("manifest refresh failed, using cached copy: {e}"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// All plugins the manifest offers, in identifier order
    ///
    /// # Errors
    ///
    /// Returns an error if no manifest can be obtained.
    pub async fn available(&self) -> Result<Vec<ManifestEntry>, Error> {
        self.ensure_manifest(false).await?;
        let store = self.manifest.lock().await;
        let manifest = store.manifest().ok_or(ManifestError::CacheMiss)?;
        Ok(manifest.entries().cloned().collect())
    }

    /// All currently installed plugins, from their install records
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem failures or damaged records.
    pub async fn installed(&self) -> Result<Vec<InstallRecord>, Error> {
        scan_records(&self.config.plugin_root).await
    }

    /// Install a plugin end to end
    ///
    /// Orchestrates: single-flight claim, manifest resolve, version
    /// gate, credential, authenticated download (one refresh-and-retry
    /// cycle on rejection), digest verification, staged extraction, and
    /// the atomic swap. Any failure after the claim leaves the
    /// previously installed version untouched and no staging or temp
    /// artifacts behind.
    ///
    /// # Errors
    ///
    /// Any failure from the pipeline stages: unknown plugin,
    /// incompatible version, auth, download, corrupt archive, or
    /// filesystem errors. `AlreadyInProgress` means an install for this
    /// identifier is running; callers should treat it as a signal
    /// rather than a failure.
    pub async fn install(
        &self,
        id: &PluginId,
        cancel: &CancelFlag,
    ) -> Result<InstallRecord, Error> {
        let result = self.install_inner(id, cancel).await;

        if let Err(e) = &result {
            if !matches!(e, Error::Install(InstallError::AlreadyInProgress { .. })) {
                self.emit(AppEvent::Install(InstallEvent::Failed {
                    id: id.clone(),
                    reason: e.user_message().into_owned(),
                }));
            }
        }

        result
    }

    async fn install_inner(
        &self,
        id: &PluginId,
        cancel: &CancelFlag,
    ) -> Result<InstallRecord, Error> {
        let _guard = self.in_flight.try_claim(id)?;
        self.emit(AppEvent::Install(InstallEvent::Queued { id: id.clone() }));

        self.ensure_manifest(false).await?;
        let entry = {
            let store = self.manifest.lock().await;
            store.resolve(id)?.clone()
        };

        gate::check_compatibility(&entry, self.config.host_version)?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let staging = unique_dir(&self.config.staging_dir(), id);
        let result = self.run_pipeline(id, &entry, &staging, cancel).await;
        if result.is_err() {
            let _ = remove_dir(&staging).await;
        }
        result
    }

    async fn run_pipeline(
        &self,
        id: &PluginId,
        entry: &ManifestEntry,
        staging: &Path,
        cancel: &CancelFlag,
    ) -> Result<InstallRecord, Error> {
        self.emit(AppEvent::Install(InstallEvent::Downloading {
            id: id.clone(),
            percent: 0.0,
        }));
        let (archive_path, from_cache) = self.obtain_archive(id, entry, cancel).await?;

        let result = self
            .extract_and_swap(id, entry, &archive_path, staging, cancel)
            .await;

        // The temp download is deleted on success and failure alike;
        // the cache copy (if any) is the only thing kept.
        if !from_cache {
            let _ = fs::remove_file(&archive_path).await;
        }

        result
    }

    /// Produce a verified archive on disk: from the download cache when
    /// possible, otherwise from the package endpoint
    async fn obtain_archive(
        &self,
        id: &PluginId,
        entry: &ManifestEntry,
        cancel: &CancelFlag,
    ) -> Result<(PathBuf, bool), Error> {
        if let Some(cached) = self.cache.lookup(&entry.checksum).await? {
            self.emit(AppEvent::Download(DownloadEvent::CacheHit {
                url: entry.url.clone(),
                checksum: entry.checksum.clone(),
            }));
            return Ok((cached, true));
        }

        let token = self.credentials.token().await?;
        let dest = self
            .config
            .downloads_dir()
            .join(format!("{id}-{}.zip", Uuid::new_v4()));

        let on_progress = self.downloading_progress(id);

        let first = self
            .downloader
            .download(
                &entry.url,
                Some(&token),
                &dest,
                Some(&entry.checksum),
                cancel,
                Some(&on_progress),
            )
            .await;

        match first {
            Ok(_) => {}
            Err(Error::Auth(AuthError::Rejected { .. })) => {
                // The server refused a token that looked valid locally.
                // Invalidate, refresh, and retry exactly once; a second
                // rejection is fatal for this invocation.
                self.credentials.invalidate().await;
                let fresh = self.credentials.token().await?;
                self.downloader
                    .download(
                        &entry.url,
                        Some(&fresh),
                        &dest,
                        Some(&entry.checksum),
                        cancel,
                        Some(&on_progress),
                    )
                    .await?;
            }
            Err(e) => return Err(e),
        }

        if let Err(e) = self.cache.insert(&entry.checksum, &dest).await {
            self.emit_warning(format!("failed to cache download: {e}"));
        }

        Ok((dest, false))
    }

    /// Progress callback translating byte counts into the install
    /// progress surface
    fn downloading_progress(&self, id: &PluginId) -> ProgressFn {
        let tx = self.tx.clone();
        let id = id.clone();
        Box::new(move |bytes, total| {
            let percent = match total {
                #[allow(clippy::cast_precision_loss)]
                Some(total) if total > 0 => (bytes as f64 / total as f64) * 100.0,
                _ => 0.0,
            };
            let _ = tx.send(AppEvent::Install(InstallEvent::Downloading {
                id: id.clone(),
                percent,
            }));
        })
    }

    async fn extract_and_swap(
        &self,
        id: &PluginId,
        entry: &ManifestEntry,
        archive_path: &Path,
        staging: &Path,
        cancel: &CancelFlag,
    ) -> Result<InstallRecord, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.emit(AppEvent::Install(InstallEvent::Extracting { id: id.clone() }));

        // Decompression and checksum work is CPU-bound; keep it off the
        // async workers.
        let task_archive = archive_path.to_path_buf();
        let task_staging = staging.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), Error> {
            let mut archive = ZipArchive::open_file(&task_archive)?;
            archive.extract_to(&task_staging, true)
        })
        .await
        .map_err(|e| InstallError::TaskError {
            message: format!("extraction task failed: {e}"),
        })??;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let live = self.config.live_dir(id);
        let record = InstallRecord {
            id: id.clone(),
            version: entry.version.clone(),
            path: live.clone(),
            installed_at: Utc::now(),
        };
        write_record(staging, &record).await?;

        let trash = unique_dir(&self.config.trash_dir(), id);
        swap_live(staging, &live, &trash).await?;

        self.emit(AppEvent::Install(InstallEvent::Installed {
            id: id.clone(),
            version: record.version.clone(),
            path: record.path.clone(),
        }));

        Ok(record)
    }

    /// Remove an installed plugin
    ///
    /// Only directories carrying an install record are touched; the
    /// record is the sole source of truth for what plugget installed.
    ///
    /// # Errors
    ///
    /// `InstallError::NotInstalled` if no record exists for the
    /// identifier; `AlreadyInProgress` if an operation on it is
    /// running.
    pub async fn uninstall(&self, id: &PluginId) -> Result<(), Error> {
        let _guard = self.in_flight.try_claim(id)?;

        let live = self.config.live_dir(id);
        if read_record(&live).await?.is_none() {
            return Err(InstallError::NotInstalled { id: id.to_string() }.into());
        }

        let trash = unique_dir(&self.config.trash_dir(), id);
        fs::rename(&live, &trash)
            .await
            .map_err(|e| InstallError::FilesystemError {
                operation: "uninstall".to_string(),
                path: live.display().to_string(),
                message: e.to_string(),
            })?;
        remove_dir(&trash).await?;

        self.emit(AppEvent::Install(InstallEvent::Uninstalled { id: id.clone() }));
        Ok(())
    }
}
