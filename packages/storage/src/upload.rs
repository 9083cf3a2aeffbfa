//! Local directory listing and per-file upload.
//!
//! [`DirectoryListing`] walks a tree depth-first with `walkdir`, sorted by
//! file name, and yields up to a page's worth of regular files per call.
//! The cursor is the paused walk, so only one page is held in memory.

use std::path::{Component, Path, PathBuf};

use oss_batch::{Operation, Page, PageSource};
use walkdir::WalkDir;

use crate::client::DEFAULT_PART_SIZE;
use crate::{StorageClient, StorageError, UploadOutcome};

/// Files per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// A local file and the object key it uploads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Path on disk.
    pub path: PathBuf,
    /// Destination object key.
    pub key: String,
}

impl std::fmt::Display for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Position of a [`DirectoryListing`] walk.
pub struct DirCursor {
    walk: walkdir::IntoIter,
}

impl std::fmt::Debug for DirCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirCursor").finish_non_exhaustive()
    }
}

/// Pages through the regular files under a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    root: PathBuf,
    base_key: String,
    page_size: usize,
}

impl DirectoryListing {
    /// Lists files under `root`; keys are paths relative to `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_key: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Prefixes every key with the name of the root folder itself, so
    /// `photos/a.jpg` is uploaded as `photos/a.jpg` instead of `a.jpg`.
    #[must_use]
    pub fn with_enclosing_folder(mut self) -> Self {
        if let Some(name) = self.root.file_name().and_then(|n| n.to_str()) {
            self.base_key = join_key(&self.base_key, name);
        }
        self
    }

    /// Prefixes every key with `prefix`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.base_key = join_key(prefix.trim_matches('/'), &self.base_key);
        self
    }

    /// Most files returned per page (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Root directory being listed.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Object key for a file at `path` under the root.
    #[must_use]
    pub fn key_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        join_key(&self.base_key, &parts.join("/"))
    }
}

/// Pulls up to `page_size` files off `walk`. Returns the walk back unless it
/// is exhausted.
fn next_files(
    mut walk: walkdir::IntoIter,
    page_size: usize,
    root: &Path,
) -> Result<(Vec<PathBuf>, Option<walkdir::IntoIter>), StorageError> {
    let mut files = Vec::new();

    while files.len() < page_size {
        let Some(entry) = walk.next() else {
            return Ok((files, None));
        };
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            StorageError::ReadDir {
                path,
                source: e.into(),
            }
        })?;

        let file_type = entry.file_type();
        if file_type.is_file() {
            files.push(entry.into_path());
        } else if file_type.is_symlink() {
            // Linked files are uploaded, linked directories are not walked
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => files.push(entry.into_path()),
                Ok(_) => log::debug!("Skipping linked directory {}", entry.path().display()),
                Err(e) => log::warn!("Skipping dangling link {}: {e}", entry.path().display()),
            }
        }
    }

    Ok((files, Some(walk)))
}

impl PageSource for DirectoryListing {
    type Item = LocalFile;
    type Cursor = DirCursor;
    type Error = StorageError;

    async fn list_page(
        &self,
        cursor: Option<DirCursor>,
    ) -> Result<Page<LocalFile, DirCursor>, StorageError> {
        let walk = match cursor {
            Some(cursor) => cursor.walk,
            None => WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
        };
        let page_size = self.page_size;
        let root = self.root.clone();

        let (paths, walk) =
            tokio::task::spawn_blocking(move || next_files(walk, page_size, &root))
                .await
                .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        log::debug!("Listed {} file(s) under {}", paths.len(), self.root.display());

        let files = paths
            .into_iter()
            .map(|path| LocalFile {
                key: self.key_for(&path),
                path,
            })
            .collect();

        Ok(match walk {
            Some(walk) => Page::more(files, DirCursor { walk }),
            None => Page::last(files),
        })
    }
}

/// Uploads one local file per item.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// `None` only logs what would be uploaded.
    client: Option<StorageClient>,
    bucket: String,
    threshold: u64,
    part_size: u64,
}

impl UploadFile {
    /// Uploads into `bucket` with the default multi-part threshold and part
    /// size.
    #[must_use]
    pub fn new(client: StorageClient, bucket: &str) -> Self {
        Self {
            client: Some(client),
            bucket: bucket.to_string(),
            threshold: DEFAULT_PART_SIZE,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Only logs what would be uploaded into `bucket`; needs no client.
    #[must_use]
    pub fn dry_run(bucket: &str) -> Self {
        Self {
            client: None,
            bucket: bucket.to_string(),
            threshold: DEFAULT_PART_SIZE,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Files larger than `threshold` bytes use a multi-part upload.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Part size for multi-part uploads.
    #[must_use]
    pub const fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Whether uploads are only logged.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.client.is_none()
    }
}

impl Operation<LocalFile> for UploadFile {
    type Error = StorageError;

    async fn run(&self, file: &LocalFile) -> Result<(), StorageError> {
        let Some(client) = &self.client else {
            log::info!(
                "Dry run: would upload {} -> s3://{}/{}",
                file.path.display(),
                self.bucket,
                file.key
            );
            return Ok(());
        };

        let outcome = client
            .upload(
                &self.bucket,
                &file.key,
                &file.path,
                self.threshold,
                self.part_size,
            )
            .await?;

        if let UploadOutcome::Multipart { parts } = outcome {
            log::info!("  {} uploaded in {parts} parts", file.key);
        }
        Ok(())
    }
}

fn join_key(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rest}"),
    }
}
