//! Per-share backup operation.
//!
//! One share is backed up in these steps:
//!
//! 1. Ensure the share's versioned bucket exists.
//! 2. Mount the export under its own mount point.
//! 3. Create a snapshot by making a directory under `.snapshot`.
//! 4. `rclone sync` the snapshot into `bucket/<snapshot>`.
//! 5. Dump the snapshot's ACLs with `getfacl` and copy them alongside the
//!    synced data.
//! 6. Remove the snapshot.
//! 7. Unmount.
//!
//! Steps 1 to 3 abort the share (after unmounting, once mounted). A failed
//! sync or unmount fails the share but the remaining cleanup still runs.
//! Steps 5 and 6 only warn.

use std::future::Future;
use std::path::{Path, PathBuf};

use oss_batch::Operation;
use oss_batch_storage::StorageClient;
use tempfile::NamedTempFile;

use crate::command::{CommandRunner, CommandSpec};
use crate::plan::{BackupPlan, Share};
use crate::BackupError;

/// File name suffix of ACL dumps.
const DUMP_SUFFIX: &str = "-permissions.facl";

/// Where share backups are stored.
pub trait BackupTarget: Send + Sync + 'static {
    /// Makes sure `bucket` exists, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be checked or created.
    fn ensure_bucket(&self, bucket: &str) -> impl Future<Output = Result<(), BackupError>> + Send;
}

impl BackupTarget for StorageClient {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), BackupError> {
        if self.bucket_exists(bucket).await? {
            log::debug!("Bucket {bucket} exists");
            return Ok(());
        }

        log::info!("Creating versioned bucket {bucket}");
        self.create_bucket(bucket, true).await?;
        Ok(())
    }
}

/// Target for dry runs: reports whether buckets would be created without
/// creating them. Without a client it only logs.
#[derive(Debug, Clone, Default)]
pub struct DryRunTarget {
    client: Option<StorageClient>,
}

impl DryRunTarget {
    #[must_use]
    pub const fn new(client: Option<StorageClient>) -> Self {
        Self { client }
    }
}

impl BackupTarget for DryRunTarget {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), BackupError> {
        let Some(client) = &self.client else {
            log::info!("Dry run: would ensure bucket {bucket} exists");
            return Ok(());
        };

        if client.bucket_exists(bucket).await? {
            log::info!("Dry run: bucket {bucket} exists");
        } else {
            log::info!("Dry run: would create versioned bucket {bucket}");
        }
        Ok(())
    }
}

/// Backs up one [`Share`] per item.
#[derive(Debug, Clone)]
pub struct ShareBackup<R, T> {
    runner: R,
    target: T,
    remote: String,
    mount_host: String,
    mount_root: PathBuf,
    mount_options: Option<String>,
    transfers: usize,
    snapshot: String,
    temp_dir: PathBuf,
}

impl<R: CommandRunner, T: BackupTarget> ShareBackup<R, T> {
    /// Backs up shares of `plan` into snapshots named `snapshot`.
    #[must_use]
    pub fn new(runner: R, target: T, plan: &BackupPlan, snapshot: &str) -> Self {
        Self {
            runner,
            target,
            remote: plan.remote.clone(),
            mount_host: plan.mount_host.clone(),
            mount_root: plan.mount_root.clone(),
            mount_options: plan.mount_options.clone(),
            transfers: plan.transfers(),
            snapshot: snapshot.to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the temporary ACL dump.
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// rclone path for `rest` inside `bucket`.
    fn remote_path(&self, bucket: &str, rest: &str) -> String {
        let separator = if self.remote.ends_with(':') || self.remote.ends_with('/') {
            ""
        } else {
            "/"
        };
        format!("{}{separator}{bucket}/{rest}", self.remote)
    }

    fn mount_command(&self, share: &Share, mount_point: &Path) -> CommandSpec {
        let options = match &self.mount_options {
            Some(extra) if !extra.is_empty() => format!("rw,{extra}"),
            _ => "rw".to_string(),
        };
        CommandSpec::new("mount")
            .arg("-o")
            .arg(options)
            .arg(format!("{}:{}", self.mount_host, share.export))
            .arg(path_arg(mount_point))
    }

    fn sync_command(&self, source: &Path, destination: String) -> CommandSpec {
        CommandSpec::new("rclone")
            .args(["sync", "--metadata", "--max-backlog", "999999", "--links"])
            .arg(format!("--transfers={}", self.transfers))
            .arg(format!("--checkers={}", self.transfers * 2))
            .arg(path_arg(source))
            .arg(destination)
    }

    /// Steps 3 to 6; returns the failures that fail the share.
    async fn backup_mounted(&self, share: &Share, bucket: &str, mount_point: &Path) -> Vec<String> {
        let snapshot_dir = mount_point.join(".snapshot").join(&self.snapshot);

        if let Err(e) = self
            .runner
            .run(&CommandSpec::new("mkdir").arg(path_arg(&snapshot_dir)))
            .await
        {
            log::error!("Failed to create snapshot for {}: {e}", share.name);
            return vec![format!("snapshot: {e}")];
        }
        log::info!("  Created snapshot {}", snapshot_dir.display());

        let mut failures = Vec::new();

        let destination = self.remote_path(bucket, &self.snapshot);
        match self
            .runner
            .run(&self.sync_command(&snapshot_dir, destination.clone()))
            .await
        {
            Ok(()) => log::info!("  Synced {} to {destination}", share.name),
            Err(e) => {
                log::error!("Sync of {} failed, continuing with cleanup: {e}", share.name);
                failures.push(format!("sync: {e}"));
            }
        }

        self.save_permissions(share, bucket, &snapshot_dir).await;

        if let Err(e) = self
            .runner
            .run(&CommandSpec::new("rmdir").arg(path_arg(&snapshot_dir)))
            .await
        {
            log::warn!(
                "Failed to remove snapshot {}, remove it manually: {e}",
                snapshot_dir.display()
            );
        }

        failures
    }

    async fn save_permissions(&self, share: &Share, bucket: &str, snapshot_dir: &Path) {
        let dump = match self.create_dump(bucket).await {
            Ok(dump) => dump,
            Err(e) => {
                log::warn!("Failed to save permissions for {}: {e}", share.name);
                return;
            }
        };
        let remote_name = format!(".{bucket}-{}{DUMP_SUFFIX}", self.snapshot);

        let getfacl = CommandSpec::new("getfacl")
            .args(["-p", "-R"])
            .arg(path_arg(snapshot_dir))
            .output_to(dump.path());
        let copy = CommandSpec::new("rclone")
            .arg("copyto")
            .arg(path_arg(dump.path()))
            .arg(self.remote_path(bucket, &format!("{}/{remote_name}", self.snapshot)));

        let result = match self.runner.run(&getfacl).await {
            Ok(()) => self.runner.run(&copy).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Failed to save permissions for {}: {e}", share.name);
        }

        let path = dump.path().to_path_buf();
        match tokio::task::spawn_blocking(move || dump.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to remove {}: {e}", path.display()),
            Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
        }
    }

    /// Creates an empty, uniquely named ACL dump file in the temp directory.
    async fn create_dump(&self, bucket: &str) -> std::io::Result<NamedTempFile> {
        let dir = self.temp_dir.clone();
        let prefix = format!(".{bucket}-{}-", self.snapshot);
        tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(DUMP_SUFFIX)
                .tempfile_in(dir)
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

impl<R: CommandRunner, T: BackupTarget> Operation<Share> for ShareBackup<R, T> {
    type Error = BackupError;

    async fn run(&self, share: &Share) -> Result<(), BackupError> {
        let bucket = share.bucket();
        let mount_point = self.mount_root.join(&share.name);
        log::info!(
            "Backing up {}:{} to {bucket}",
            self.mount_host,
            share.export
        );

        self.target.ensure_bucket(&bucket).await?;

        self.runner
            .run(&CommandSpec::new("mkdir").arg("-p").arg(path_arg(&mount_point)))
            .await?;
        self.runner
            .run(&self.mount_command(share, &mount_point))
            .await?;

        let mut failures = self.backup_mounted(share, &bucket, &mount_point).await;

        if let Err(e) = self
            .runner
            .run(&CommandSpec::new("umount").arg(path_arg(&mount_point)))
            .await
        {
            log::error!("Failed to unmount {}: {e}", mount_point.display());
            failures.push(format!("unmount: {e}"));
        }

        if failures.is_empty() {
            log::info!("Finished backup of {}", share.name);
            Ok(())
        } else {
            Err(BackupError::Share {
                share: share.name.clone(),
                failures,
            })
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
