#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the object storage batch tools.
//!
//! * `clean` deletes every object in a bucket (or under a prefix).
//! * `upload` uploads a local directory tree.
//! * `backup` snapshots NFS shares and syncs them into versioned buckets.
//!
//! Storage credentials come from the environment; see
//! [`oss_batch_storage`] for the variables.

mod batch;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use oss_batch_backup::{
    BackupKind, BackupPlan, DryRunRunner, DryRunTarget, ShareBackup, SystemRunner,
};
use oss_batch_cli_utils::{MultiProgress, init_logger};
use oss_batch_storage::bucket::{BucketListing, DeleteObject};
use oss_batch_storage::client::DEFAULT_PART_SIZE;
use oss_batch_storage::upload::{DirectoryListing, UploadFile};
use oss_batch_storage::StorageClient;

use crate::batch::run_batch;

#[derive(Parser)]
#[command(name = "oss_batch", about = "Object storage batch tools")]
struct Cli {
    /// Log debug output from the batch tools
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every object in a bucket, or every object under a prefix
    Clean {
        /// Bucket to clean
        #[arg(long)]
        bucket: String,
        /// Only delete keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Maximum number of concurrent deletions
        #[arg(short = 'p', long, default_value_t = 5)]
        parallelism: usize,
        /// Log what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Upload a local directory tree into a bucket
    Upload {
        /// Directory to upload
        #[arg(long)]
        folder: PathBuf,
        /// Destination bucket
        #[arg(long)]
        bucket: String,
        /// Key prefix for every uploaded object
        #[arg(long)]
        prefix: Option<String>,
        /// Keep the folder's own name as the first key segment
        #[arg(long)]
        enclosing: bool,
        /// Maximum number of concurrent file uploads
        #[arg(short = 'p', long, default_value_t = 5)]
        parallelism: usize,
        /// Files larger than this many bytes use a multi-part upload
        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        threshold: u64,
        /// Part size in bytes for multi-part uploads
        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: u64,
        /// Log what would be uploaded without uploading anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Snapshot NFS shares and sync them into per-share versioned buckets
    Backup {
        /// Backup plan file (TOML)
        #[arg(long)]
        plan: PathBuf,
        /// Backup schedule: daily reuses one snapshot name, weekly and
        /// monthly snapshots are timestamped
        #[arg(long, default_value_t = BackupKind::Daily)]
        kind: BackupKind,
        /// Only back up this share (display name or export path)
        #[arg(long)]
        share: Option<String>,
        /// Maximum number of shares backed up at once
        #[arg(short = 'p', long, default_value_t = 1)]
        parallelism: usize,
        /// Log the commands that would run without running them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = init_logger(cli.verbose);
    let start = Instant::now();

    let failed = match cli.command {
        Commands::Clean {
            bucket,
            prefix,
            parallelism,
            dry_run,
        } => clean(&multi, &bucket, prefix.as_deref(), parallelism, dry_run).await?,
        Commands::Upload {
            folder,
            bucket,
            prefix,
            enclosing,
            parallelism,
            threshold,
            part_size,
            dry_run,
        } => {
            let mut listing = DirectoryListing::new(folder);
            if enclosing {
                listing = listing.with_enclosing_folder();
            }
            if let Some(prefix) = &prefix {
                listing = listing.with_prefix(prefix);
            }
            let operation = if dry_run {
                UploadFile::dry_run(&bucket)
            } else {
                UploadFile::new(StorageClient::from_env()?, &bucket)
            }
            .with_threshold(threshold)
            .with_part_size(part_size);
            upload(&multi, &listing, &bucket, parallelism, operation).await?
        }
        Commands::Backup {
            plan,
            kind,
            share,
            parallelism,
            dry_run,
        } => backup(&multi, &plan, kind, share.as_deref(), parallelism, dry_run).await?,
    };

    log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());

    if failed > 0 {
        return Err(format!("{failed} item(s) failed").into());
    }
    Ok(())
}

async fn clean(
    multi: &MultiProgress,
    bucket: &str,
    prefix: Option<&str>,
    parallelism: usize,
    dry_run: bool,
) -> Result<u64, Box<dyn std::error::Error>> {
    log::info!("Cleaning s3://{bucket}/{}", prefix.unwrap_or(""));
    log::info!("  Parallelism: {parallelism}");
    if dry_run {
        log::info!("  Dry run: nothing will be deleted");
    }

    let client = StorageClient::from_env()?;
    let listing = BucketListing::new(client.clone(), bucket).with_prefix(prefix.unwrap_or(""));
    let operation = DeleteObject::new(client, bucket, dry_run);

    run_batch(multi, "Deleting", parallelism, &listing, operation).await
}

async fn upload(
    multi: &MultiProgress,
    listing: &DirectoryListing,
    bucket: &str,
    parallelism: usize,
    operation: UploadFile,
) -> Result<u64, Box<dyn std::error::Error>> {
    let root = listing.root();
    if !tokio::fs::metadata(root).await?.is_dir() {
        return Err(format!("{} is not a directory", root.display()).into());
    }

    log::info!("Uploading {} to s3://{bucket}", root.display());
    log::info!("  Parallelism: {parallelism}");
    if operation.is_dry_run() {
        log::info!("  Dry run: nothing will be uploaded");
    }

    run_batch(multi, "Uploading", parallelism, listing, operation).await
}

async fn backup(
    multi: &MultiProgress,
    plan_path: &std::path::Path,
    kind: BackupKind,
    only: Option<&str>,
    parallelism: usize,
    dry_run: bool,
) -> Result<u64, Box<dyn std::error::Error>> {
    let plan = BackupPlan::load(plan_path)?;
    let listing = plan.listing(only)?;
    let snapshot = kind.snapshot_name(&chrono::Local::now());

    log::info!(
        "Starting {kind} backup of {} share(s) from {}",
        listing.len(),
        plan.mount_host
    );
    log::info!("  Snapshot: {snapshot}");
    log::info!("  Remote: {}", plan.remote);
    log::info!("  Parallelism: {parallelism}");

    if dry_run {
        let client = match StorageClient::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                log::warn!("Bucket checks skipped: {e}");
                None
            }
        };
        let operation = ShareBackup::new(DryRunRunner, DryRunTarget::new(client), &plan, &snapshot);
        run_batch(multi, "Backing up", parallelism, &listing, operation).await
    } else {
        let client = StorageClient::from_env()?;
        let operation = ShareBackup::new(SystemRunner, client, &plan, &snapshot);
        run_batch(multi, "Backing up", parallelism, &listing, operation).await
    }
}
