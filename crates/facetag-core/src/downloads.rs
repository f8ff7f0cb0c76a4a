//! Download history store.
//!
//! A JSON array of download records kept under the `user_downloads` key,
//! which maps to `<data_dir>/user_downloads.json` on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage key (and file stem) of the download history.
pub const USER_DOWNLOADS_KEY: &str = "user_downloads";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed download history: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid download record: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    Standard,
    Extended,
    Editorial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub user_id: String,
    pub image_id: String,
    pub license_type: LicenseType,
    /// Delivered size, e.g. "6000x4000" or "web".
    pub resolution: String,
    pub price_paid: f64,
    pub download_date: DateTime<Utc>,
    pub image_title: String,
}

impl DownloadRecord {
    fn validate(&self) -> Result<(), DownloadError> {
        if self.user_id.trim().is_empty() {
            return Err(DownloadError::Invalid("empty user_id".into()));
        }
        if self.image_id.trim().is_empty() {
            return Err(DownloadError::Invalid("empty image_id".into()));
        }
        if !self.price_paid.is_finite() || self.price_paid < 0.0 {
            return Err(DownloadError::Invalid(format!("bad price_paid {}", self.price_paid)));
        }
        Ok(())
    }
}

/// File-backed list of downloads, oldest first.
#[derive(Debug)]
pub struct DownloadHistory {
    path: PathBuf,
    records: Vec<DownloadRecord>,
}

impl DownloadHistory {
    /// Path of the history file inside `data_dir`.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{USER_DOWNLOADS_KEY}.json"))
    }

    /// Load the history from `data_dir`. A missing file is an empty history.
    pub fn load(data_dir: &Path) -> Result<Self, DownloadError> {
        let path = Self::path_in(data_dir);
        let records = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(DownloadError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), records = records.len(), "download history loaded");
        Ok(Self { path, records })
    }

    /// Append a record and write the history back to disk.
    ///
    /// The record is only kept in memory if the write succeeds.
    pub fn record(&mut self, record: DownloadRecord) -> Result<(), DownloadError> {
        record.validate()?;
        let (user_id, image_id, license) =
            (record.user_id.clone(), record.image_id.clone(), record.license_type);
        self.records.push(record);
        if let Err(e) = self.save() {
            self.records.pop();
            tracing::warn!(%user_id, %image_id, error = %e, "download not recorded");
            return Err(e);
        }
        tracing::info!(%user_id, %image_id, ?license, "download recorded");
        Ok(())
    }

    /// All downloads by `user_id`, newest first.
    pub fn for_user(&self, user_id: &str) -> Vec<&DownloadRecord> {
        let mut out: Vec<&DownloadRecord> =
            self.records.iter().filter(|r| r.user_id == user_id).collect();
        out.sort_by(|a, b| b.download_date.cmp(&a.download_date));
        out
    }

    pub fn total_spent(&self, user_id: &str) -> f64 {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.price_paid)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self) -> Result<(), DownloadError> {
        let io_err = |source| DownloadError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}
