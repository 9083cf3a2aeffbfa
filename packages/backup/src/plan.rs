//! Backup plan file, share naming and snapshot naming.
//!
//! A plan looks like:
//!
//! ```toml
//! remote = "oci:"
//! mount_host = "10.0.0.5"
//! transfers = 16
//!
//! [[shares]]
//! export = "/finance/reports"
//!
//! [[shares]]
//! export = "/home"
//! name = "home-dirs"
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use oss_batch::{Page, PageSource};
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::BackupError;

/// Default parent directory for share mount points.
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt/oss-batch";

/// Suffix appended to a share's display name to form its bucket name.
pub const BUCKET_SUFFIX: &str = "_backup";

/// Backup schedule, which decides the snapshot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BackupKind {
    /// Reuses one fixed snapshot name so each sync is incremental.
    #[default]
    Daily,
    /// Timestamped snapshot.
    Weekly,
    /// Timestamped snapshot.
    Monthly,
}

impl BackupKind {
    /// Snapshot directory name for a backup started at `started`.
    #[must_use]
    pub fn snapshot_name<Tz: TimeZone>(self, started: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match self {
            Self::Daily => "FSS-daily-Backup".to_string(),
            Self::Weekly | Self::Monthly => format!(
                "FSS-{}-Backup-{}",
                self.as_ref(),
                started.format("%Y-%m-%d_%H-%M-%S")
            ),
        }
    }
}

/// One share entry as written in the plan file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareSpec {
    /// NFS export path on the mount host.
    pub export: String,
    /// Display name; derived from the export path when absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Backup plan loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupPlan {
    /// rclone remote the buckets live under, e.g. `oci:`.
    pub remote: String,
    /// Host serving the NFS exports.
    pub mount_host: String,
    /// Directory under which each share gets its own mount point.
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    /// Extra `mount -o` options added after `rw`.
    #[serde(default)]
    pub mount_options: Option<String>,
    /// rclone `--transfers`; defaults to the number of CPUs.
    #[serde(default)]
    pub transfers: Option<usize>,
    /// Shares to back up.
    pub shares: Vec<ShareSpec>,
}

fn default_mount_root() -> PathBuf {
    PathBuf::from(DEFAULT_MOUNT_ROOT)
}

impl BackupPlan {
    /// Reads and validates a plan file.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::ReadPlan`] if the file cannot be read, or a
    /// parse or validation error from [`Self::from_toml`].
    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let text = std::fs::read_to_string(path).map_err(|source| BackupError::ReadPlan {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates a plan.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::ParsePlan`] for malformed TOML and
    /// [`BackupError::InvalidPlan`] when a required value is empty, a share
    /// name is unusable, or two shares share a name.
    pub fn from_toml(text: &str) -> Result<Self, BackupError> {
        let plan: Self = toml::from_str(text)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), BackupError> {
        let invalid = |reason: String| BackupError::InvalidPlan { reason };

        if self.remote.trim().is_empty() {
            return Err(invalid("remote must not be empty".to_string()));
        }
        if self.mount_host.trim().is_empty() {
            return Err(invalid("mount_host must not be empty".to_string()));
        }
        if self.transfers == Some(0) {
            return Err(invalid("transfers must be at least 1".to_string()));
        }

        let mut seen = std::collections::BTreeSet::new();
        for share in self.shares() {
            if share.name.is_empty() || share.name.contains('/') || share.name.starts_with('.') {
                return Err(invalid(format!(
                    "share for export '{}' has unusable name '{}'",
                    share.export, share.name
                )));
            }
            if !seen.insert(share.name.clone()) {
                return Err(invalid(format!("duplicate share name '{}'", share.name)));
            }
        }
        Ok(())
    }

    /// All shares with their resolved names, in plan order.
    #[must_use]
    pub fn shares(&self) -> Vec<Share> {
        self.shares.iter().map(Share::from_spec).collect()
    }

    /// rclone transfer count, defaulting to the available parallelism.
    #[must_use]
    pub fn transfers(&self) -> usize {
        self.transfers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
        })
    }

    /// Listing of the plan's shares, or just the one named `only`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::UnknownShare`] if `only` names no share.
    pub fn listing(&self, only: Option<&str>) -> Result<ShareListing, BackupError> {
        let mut shares = self.shares();
        if let Some(name) = only {
            shares.retain(|share| share.name == name || share.export == name);
            if shares.is_empty() {
                return Err(BackupError::UnknownShare {
                    name: name.to_string(),
                });
            }
        }
        Ok(ShareListing { shares })
    }
}

/// A share with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Display name, also the mount point directory name.
    pub name: String,
    /// NFS export path.
    pub export: String,
}

impl Share {
    fn from_spec(spec: &ShareSpec) -> Self {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| display_name(&spec.export));
        Self {
            name,
            export: spec.export.clone(),
        }
    }

    /// Bucket receiving this share's snapshots.
    #[must_use]
    pub fn bucket(&self) -> String {
        format!("{}{BUCKET_SUFFIX}", self.name)
    }
}

impl std::fmt::Display for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Derives a share name from its export path: `/a/b/` becomes `a-b`.
#[must_use]
pub fn display_name(export: &str) -> String {
    export.trim_matches('/').replace('/', "-")
}

/// Single-page listing of the shares to back up.
#[derive(Debug, Clone)]
pub struct ShareListing {
    shares: Vec<Share>,
}

impl ShareListing {
    #[must_use]
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

impl PageSource for ShareListing {
    type Item = Share;
    type Cursor = ();
    type Error = BackupError;

    async fn list_page(&self, _cursor: Option<()>) -> Result<Page<Share, ()>, BackupError> {
        Ok(Page::last(self.shares.clone()))
    }
}
