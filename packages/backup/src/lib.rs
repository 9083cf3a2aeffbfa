#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Snapshot-based backup of NFS file shares into object storage.
//!
//! Each share in a [`plan::BackupPlan`] is mounted, snapshotted through its
//! `.snapshot` directory, synced with `rclone` into a per-share versioned
//! bucket and cleaned up again. [`share::ShareBackup`] is the per-share
//! [`oss_batch::Operation`]; [`plan::ShareListing`] feeds the shares to the
//! batch driver.
//!
//! External programs (`mount`, `rclone`, `getfacl`, ...) run through a
//! [`command::CommandRunner`] so a dry run or a test can swap them out.

pub mod command;
pub mod plan;
pub mod share;

pub use command::{CommandRunner, CommandSpec, DryRunRunner, SystemRunner};
pub use plan::{BackupKind, BackupPlan, Share, ShareListing};
pub use share::{BackupTarget, DryRunTarget, ShareBackup};

/// Errors that can occur while backing up file shares.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The plan file could not be read.
    #[error("Failed to read backup plan {}: {source}", .path.display())]
    ReadPlan {
        /// Plan file path.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The plan file is not valid TOML or has the wrong shape.
    #[error("Invalid backup plan: {0}")]
    ParsePlan(#[from] toml::de::Error),

    /// The plan parsed but its contents are unusable.
    #[error("Invalid backup plan: {reason}")]
    InvalidPlan {
        /// What is wrong with the plan.
        reason: String,
    },

    /// A share was requested that the plan does not contain.
    #[error("Share '{name}' is not in the backup plan")]
    UnknownShare {
        /// Requested share name.
        name: String,
    },

    /// An external program could not be started.
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully.
    #[error("`{command}` failed ({status}){}", fmt_detail(.detail))]
    Command {
        /// Command line.
        command: String,
        /// Exit status.
        status: String,
        /// Trailing stderr output, if any.
        detail: String,
    },

    /// A command's output file is a symbolic link.
    #[error("Refusing to write command output through symlink {}", .path.display())]
    OutputSymlink {
        /// Output file path.
        path: std::path::PathBuf,
    },

    /// One or more required backup steps failed for a share.
    #[error("Backup of share {share} failed: {}", .failures.join("; "))]
    Share {
        /// Share display name.
        share: String,
        /// Failed steps.
        failures: Vec<String>,
    },

    /// Object storage error.
    #[error(transparent)]
    Storage(#[from] oss_batch_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}
