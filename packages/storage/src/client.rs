//! Thin wrapper over `aws_sdk_s3::Client` with the calls the batch tools
//! need.

use std::path::Path;

use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CompletedMultipartUpload, CompletedPart,
    CreateBucketConfiguration, VersioningConfiguration,
};
use oss_batch::Page;

use crate::{StorageError, StorageSettings};

/// Smallest part S3 accepts (except for the last part).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part S3 accepts (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Most parts a single multi-part upload may have.
pub const MAX_PARTS: u64 = 10_000;

/// Default part size and multi-part threshold (128 MiB).
pub const DEFAULT_PART_SIZE: u64 = 128 * 1024 * 1024;

/// Region that must not be sent as a location constraint.
const LEGACY_REGION: &str = "us-east-1";

/// How a file ended up in the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Single `PutObject`.
    Single,
    /// Multi-part upload with this many parts.
    Multipart {
        /// Number of parts uploaded.
        parts: u64,
    },
}

/// Client for an S3-compatible object store.
///
/// Cloning is cheap and clones share the underlying connection pool, so one
/// client is built per process and handed to every operation.
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: aws_sdk_s3::Client,
    region: String,
}

impl StorageClient {
    /// Creates a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if any required variable is unset.
    pub fn from_env() -> Result<Self, StorageError> {
        Ok(Self::from_settings(&StorageSettings::from_env()?))
    }

    /// Creates a client from resolved settings.
    #[must_use]
    pub fn from_settings(settings: &StorageSettings) -> Self {
        let creds = Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "oss-env",
        );

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(&settings.endpoint)
            .region(Region::new(settings.region.clone()))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            region: settings.region.clone(),
        }
    }

    /// Lists one page of object keys under `prefix`.
    ///
    /// The returned cursor is the `ListObjectsV2` continuation token and is
    /// only present while the listing is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] on S3 failures.
    pub async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<String>,
    ) -> Result<Page<String, String>, StorageError> {
        log::debug!("Listing s3://{bucket}/{prefix}* (continuation={cursor:?})");

        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .set_continuation_token(cursor)
            .send()
            .await
            .map_err(|e| StorageError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(str::to_string)
            .collect();

        let next = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(Page { items: keys, next })
    }

    /// Deletes an object.
    ///
    /// Silently succeeds if the object doesn't exist (S3 `DeleteObject`
    /// is idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] on S3 failures.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        log::debug!("Deleting s3://{bucket}/{key}");

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    /// Uploads a local file, using a multi-part upload when the file is
    /// larger than `threshold` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] on S3 failures, [`StorageError::Io`]
    /// if the file cannot be inspected.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        threshold: u64,
        part_size: u64,
    ) -> Result<UploadOutcome, StorageError> {
        let size = tokio::fs::metadata(local_path).await?.len();
        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = size as f64 / 1_048_576.0;
        log::info!(
            "Pushing {} -> s3://{bucket}/{key} ({mb:.1} MB)",
            local_path.display()
        );

        if size > threshold {
            let parts = self
                .multipart_upload(bucket, key, local_path, size, part_size)
                .await?;
            Ok(UploadOutcome::Multipart { parts })
        } else {
            self.put_object(bucket, key, local_path).await?;
            Ok(UploadOutcome::Single)
        }
    }

    /// Uploads a local file with a single `PutObject`, streaming it from
    /// disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] on S3 or read failures.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| upload_error(bucket, key, e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| upload_error(bucket, key, e))?;

        log::debug!("  uploaded {key}");
        Ok(())
    }

    /// Uploads `size` bytes of a local file as a multi-part upload and
    /// returns the number of parts.
    ///
    /// Parts are uploaded one after another; concurrency comes from running
    /// several files at once. If any part or the completion fails, the
    /// upload is aborted before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] on S3 or read failures.
    pub async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        size: u64,
        part_size: u64,
    ) -> Result<u64, StorageError> {
        let part_size = effective_part_size(size, part_size);

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| upload_error(bucket, key, e))?;

        let Some(upload_id) = created.upload_id().map(str::to_string) else {
            return Err(upload_error(bucket, key, "no upload id in response"));
        };

        match self
            .upload_parts(bucket, key, local_path, &upload_id, size, part_size)
            .await
        {
            Ok(parts) => {
                log::debug!("  uploaded {key} in {parts} part(s)");
                Ok(parts)
            }
            Err(e) => {
                log::warn!("Aborting multi-part upload of s3://{bucket}/{key}: {e}");
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    log::warn!("  abort failed, upload id {upload_id} needs manual cleanup: {abort}");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        upload_id: &str,
        size: u64,
        part_size: u64,
    ) -> Result<u64, StorageError> {
        let mut parts = Vec::new();

        for (number, offset, length) in part_ranges(size, part_size) {
            let number = i32::try_from(number)
                .map_err(|_| upload_error(bucket, key, "part number out of range"))?;
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| upload_error(bucket, key, e))?;

            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(number)
                .body(body)
                .send()
                .await
                .map_err(|e| upload_error(bucket, key, e))?;

            log::trace!("  {key}: part {number} ({length} bytes at {offset})");
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(number)
                    .build(),
            );
        }

        let count = parts.len() as u64;
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| upload_error(bucket, key, e))?;

        Ok(count)
    }

    /// Returns whether `bucket` exists and is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::HeadBucket`] on failures other than
    /// `NotFound`.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                // NotFound is an answer, not an error
                if err
                    .as_service_error()
                    .is_some_and(HeadBucketError::is_not_found)
                {
                    return Ok(false);
                }
                Err(StorageError::HeadBucket {
                    bucket: bucket.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Creates `bucket`, optionally with object versioning enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CreateBucket`] on S3 failures.
    pub async fn create_bucket(&self, bucket: &str, versioned: bool) -> Result<(), StorageError> {
        log::info!("Creating bucket {bucket} (versioning={versioned})");

        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != LEGACY_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| StorageError::CreateBucket {
                bucket: bucket.to_string(),
                source: Box::new(e),
            })?;

        if versioned {
            self.client
                .put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(
                    VersioningConfiguration::builder()
                        .status(BucketVersioningStatus::Enabled)
                        .build(),
                )
                .send()
                .await
                .map_err(|e| StorageError::CreateBucket {
                    bucket: bucket.to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }
}

/// Picks the part size for a multi-part upload of `file_size` bytes.
///
/// Starts from `requested` clamped to [`MIN_PART_SIZE`]..=[`MAX_PART_SIZE`],
/// then raises it so the file fits in [`MAX_PARTS`] parts (never past
/// [`MAX_PART_SIZE`]).
#[must_use]
pub const fn effective_part_size(file_size: u64, requested: u64) -> u64 {
    let size = if requested < MIN_PART_SIZE {
        MIN_PART_SIZE
    } else if requested > MAX_PART_SIZE {
        MAX_PART_SIZE
    } else {
        requested
    };
    let required = file_size.div_ceil(MAX_PARTS);
    if required <= size {
        size
    } else if required > MAX_PART_SIZE {
        MAX_PART_SIZE
    } else {
        required
    }
}

/// Splits `size` bytes into `(part_number, offset, length)` ranges of
/// `part_size` bytes; part numbers start at 1 and the last part holds the
/// remainder.
pub fn part_ranges(size: u64, part_size: u64) -> impl Iterator<Item = (u64, u64, u64)> {
    let part_size = part_size.max(1);
    (0..size.div_ceil(part_size)).map(move |index| {
        let offset = index * part_size;
        (index + 1, offset, part_size.min(size - offset))
    })
}

fn upload_error(
    bucket: &str,
    key: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> StorageError {
    StorageError::Upload {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source: source.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn part_size_is_raised_to_s3_minimum() {
        assert_eq!(effective_part_size(100 * MIB, MIB), MIN_PART_SIZE);
    }

    #[test]
    fn requested_part_size_is_kept_when_valid() {
        assert_eq!(effective_part_size(1024 * MIB, 16 * MIB), 16 * MIB);
    }

    #[test]
    fn part_size_is_capped_at_s3_maximum() {
        assert_eq!(effective_part_size(100 * MIB, 8 * 1024 * MIB), MAX_PART_SIZE);
        assert_eq!(effective_part_size(u64::MAX / 2, DEFAULT_PART_SIZE), MAX_PART_SIZE);
    }

    #[test]
    fn part_ranges_cover_exact_multiple() {
        let parts: Vec<_> = part_ranges(15 * MIB, 5 * MIB).collect();
        assert_eq!(
            parts,
            vec![(1, 0, 5 * MIB), (2, 5 * MIB, 5 * MIB), (3, 10 * MIB, 5 * MIB)]
        );
    }

    #[test]
    fn last_part_ranges_holds_remainder() {
        let parts: Vec<_> = part_ranges(12 * MIB + 7, 5 * MIB).collect();
        assert_eq!(
            parts,
            vec![(1, 0, 5 * MIB), (2, 5 * MIB, 5 * MIB), (3, 10 * MIB, 2 * MIB + 7)]
        );
        let total: u64 = parts.iter().map(|(_, _, length)| length).sum();
        assert_eq!(total, 12 * MIB + 7);
    }

    #[test]
    fn small_file_is_a_single_part() {
        assert_eq!(part_ranges(10, 5 * MIB).collect::<Vec<_>>(), vec![(1, 0, 10)]);
        assert_eq!(part_ranges(0, 5 * MIB).count(), 0);
    }

    #[tokio::test]
    async fn upload_of_missing_file_fails_before_any_request() {
        let client = StorageClient::from_settings(&StorageSettings {
            endpoint: "http://127.0.0.1:9".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
        });
        let path = std::env::temp_dir().join("oss_batch_client_missing_file");
        let _ = std::fs::remove_file(&path);

        let err = client
            .upload("bucket", "key", &path, DEFAULT_PART_SIZE, DEFAULT_PART_SIZE)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn part_size_grows_to_stay_within_part_limit() {
        let file_size = 2 * 1024 * 1024 * MIB; // 2 TiB
        let size = effective_part_size(file_size, DEFAULT_PART_SIZE);
        assert!(size > DEFAULT_PART_SIZE);
        assert!(file_size.div_ceil(size) <= MAX_PARTS);
    }
}
