//! Install record persistence
//!
//! The record lives inside the installed plugin directory and rides
//! through the atomic swap with it, so its existence always implies a
//! complete, validated install.

use plugget_errors::{Error, InstallError};
use plugget_types::InstallRecord;
use std::path::Path;
use tokio::fs;

/// Write the record into a (staging) directory
pub(crate) async fn write_record(dir: &Path, record: &InstallRecord) -> Result<(), Error> {
    let path = dir.join(InstallRecord::FILE_NAME);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(())
}

/// Read the record from an installed plugin directory, if present
///
/// # Errors
///
/// Returns `InstallError::InvalidRecord` if a record file exists but
/// cannot be parsed.
pub async fn read_record(dir: &Path) -> Result<Option<InstallRecord>, Error> {
    let path = dir.join(InstallRecord::FILE_NAME);
    let json = match fs::read_to_string(&path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };

    let record = serde_json::from_str(&json).map_err(|e| InstallError::InvalidRecord {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(record))
}

/// Scan the plugin root for installed plugins
pub(crate) async fn scan_records(root: &Path) -> Result<Vec<InstallRecord>, Error> {
    let mut records = Vec::new();

    let mut dir = match fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(Error::io_with_path(&e, root)),
    };

    while let Some(entry) = dir.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(record) = read_record(&entry.path()).await? {
            records.push(record);
        }
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}
