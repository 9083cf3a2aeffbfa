#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3-compatible object storage for the batch tools.
//!
//! Wraps `aws_sdk_s3` behind [`StorageClient`] and plugs it into the
//! [`oss_batch`] driver:
//!
//! * [`bucket::BucketListing`] pages through a bucket with `ListObjectsV2`
//!   and [`bucket::DeleteObject`] removes one key per item.
//! * [`upload::DirectoryListing`] walks a local tree one directory per page
//!   and [`upload::UploadFile`] uploads one file per item, switching to a
//!   multi-part upload above a size threshold.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `OSS_ENDPOINT_URL` | No* | Full S3-compatible endpoint URL |
//! | `OCI_NAMESPACE` | No* | Object storage namespace (builds the OCI endpoint) |
//! | `OCI_REGION` | No* | OCI region, e.g. `us-ashburn-1` (builds the OCI endpoint) |
//! | `OSS_REGION` | No | Signing region (defaults to `OCI_REGION`, then `us-east-1`) |
//! | `OSS_ACCESS_KEY_ID` | Yes | S3-compatible access key |
//! | `OSS_SECRET_ACCESS_KEY` | Yes | S3-compatible secret key |
//!
//! \* Either `OSS_ENDPOINT_URL` or both `OCI_NAMESPACE` and `OCI_REGION`.

pub mod bucket;
pub mod client;
pub mod settings;
pub mod upload;

pub use client::{StorageClient, UploadOutcome};
pub use settings::StorageSettings;

/// Errors that can occur during object storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// S3 `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `DeleteObject` failed.
    #[error("Failed to delete s3://{bucket}/{key}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `PutObject` or one of the multi-part upload calls failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `HeadBucket` failed for a reason other than the bucket missing.
    #[error("Failed to head bucket {bucket}: {source}")]
    HeadBucket {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `CreateBucket` or `PutBucketVersioning` failed.
    #[error("Failed to create bucket {bucket}: {source}")]
    CreateBucket {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading a local directory failed.
    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDir {
        /// Directory being listed.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error reading local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
