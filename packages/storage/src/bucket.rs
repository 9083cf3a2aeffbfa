//! Bucket listing and per-key deletion for bucket cleaning.

use oss_batch::{Operation, Page, PageSource};

use crate::{StorageClient, StorageError};

/// Pages through the keys of a bucket, optionally under a prefix.
#[derive(Debug, Clone)]
pub struct BucketListing {
    client: StorageClient,
    bucket: String,
    prefix: String,
}

impl BucketListing {
    /// Lists every key in `bucket`.
    #[must_use]
    pub fn new(client: StorageClient, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: String::new(),
        }
    }

    /// Restricts the listing to keys starting with `prefix`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        prefix.clone_into(&mut self.prefix);
        self
    }
}

impl PageSource for BucketListing {
    type Item = String;
    type Cursor = String;
    type Error = StorageError;

    async fn list_page(&self, cursor: Option<String>) -> Result<Page<String, String>, StorageError> {
        self.client
            .list_page(&self.bucket, &self.prefix, cursor)
            .await
    }
}

/// Deletes one object per item.
#[derive(Debug, Clone)]
pub struct DeleteObject {
    client: StorageClient,
    bucket: String,
    dry_run: bool,
}

impl DeleteObject {
    /// Deletes keys from `bucket`. With `dry_run` the deletion is only
    /// logged.
    #[must_use]
    pub fn new(client: StorageClient, bucket: &str, dry_run: bool) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            dry_run,
        }
    }
}

impl Operation<String> for DeleteObject {
    type Error = StorageError;

    async fn run(&self, key: &String) -> Result<(), StorageError> {
        if self.dry_run {
            log::info!("Dry run: would delete s3://{}/{key}", self.bucket);
            return Ok(());
        }
        self.client.delete(&self.bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use oss_batch::{BatchDriver, Page, PageSource};

    use super::*;
    use crate::StorageSettings;

    struct Keys(Vec<&'static str>);

    impl PageSource for Keys {
        type Item = String;
        type Cursor = usize;
        type Error = StorageError;

        async fn list_page(&self, cursor: Option<usize>) -> Result<Page<String, usize>, StorageError> {
            let start = cursor.unwrap_or(0);
            let end = (start + 2).min(self.0.len());
            let items = self.0[start..end].iter().map(ToString::to_string).collect();
            Ok(if end < self.0.len() {
                Page::more(items, end)
            } else {
                Page::last(items)
            })
        }
    }

    fn unreachable_client() -> StorageClient {
        StorageClient::from_settings(&StorageSettings {
            endpoint: "http://127.0.0.1:9".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
        })
    }

    #[tokio::test]
    async fn dry_run_delete_touches_no_endpoint() {
        let keys = Keys(vec!["a", "b", "c", "d", "e"]);
        let operation = DeleteObject::new(unreachable_client(), "bucket", true);

        let summary = BatchDriver::new(3).run(&keys, operation).await.unwrap();

        assert_eq!(summary.submitted, 5);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.failed, 0);
    }
}
