//! Storage locations and backend-agnostic byte IO.
//!
//! This module centralizes every interaction with the backing medium. A
//! [`StorageLocation`] names a root (a local directory or a prefix in an
//! object-storage bucket) and the free functions here perform IO on paths
//! *relative* to that root:
//!
//! - [`write_atomic`]: replace a file in one step (temp + fsync + rename
//!   locally; a single put on buckets, which is atomic by construction).
//! - [`write_new`]: create-only write, the guard used for commit files.
//! - [`read_to_string`] / [`read_all_bytes`]: whole-object reads.
//! - [`delete`], [`delete_prefix`], [`list_dirs`]: maintenance used by pruning,
//!   library resets and key listing.
//!
//! Higher layers (`transaction_log`, `store`) never build absolute paths or
//! talk to a backend directly; relative path conventions live in
//! [`layout`].

mod bucket;
pub mod error;
pub mod layout;

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use snafu::prelude::*;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

pub use bucket::{BucketLocation, BucketScheme};
pub use error::{BackendError, StorageError};
pub(crate) use error::{InvalidLocationSnafu, OtherIoSnafu, classify_local_error};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root of a storage namespace.
///
/// Both variants expose the same operations; which one is used is decided
/// once, when a locator string is parsed.
#[derive(Clone, Debug)]
pub enum StorageLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
    /// A prefix inside an object-storage bucket.
    Bucket(BucketLocation),
}

impl StorageLocation {
    /// Creates a location for a local filesystem directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Creates a location backed by a fresh, process-local in-memory bucket.
    pub fn memory(bucket: &str) -> Self {
        StorageLocation::Bucket(BucketLocation::in_memory(bucket))
    }

    /// Parse a user-facing locator string.
    ///
    /// - `s3://<bucket>/<prefix>`: Amazon S3, configured from `AWS_*` env vars.
    /// - `memory://<bucket>/<prefix>`: in-process object store.
    /// - `file://<path>` or a plain path: local directory.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        ensure!(
            !trimmed.is_empty(),
            InvalidLocationSnafu {
                spec,
                reason: "locator is empty",
            }
        );

        match trimmed.split_once("://") {
            None => Ok(StorageLocation::Local(PathBuf::from(trimmed))),
            Some(("file", path)) => {
                ensure!(
                    !path.is_empty(),
                    InvalidLocationSnafu {
                        spec,
                        reason: "file:// locator has no path",
                    }
                );
                Ok(StorageLocation::Local(PathBuf::from(path)))
            }
            Some((scheme, rest)) => {
                let scheme = BucketScheme::from_scheme(scheme).context(InvalidLocationSnafu {
                    spec,
                    reason: format!("unsupported scheme {scheme:?}"),
                })?;
                BucketLocation::parse(spec, scheme, rest).map(StorageLocation::Bucket)
            }
        }
    }

    /// Location for the sub-tree at `rel` under this root.
    pub fn child(&self, rel: &Path) -> StorageLocation {
        match self {
            StorageLocation::Local(root) => StorageLocation::Local(root.join(rel)),
            StorageLocation::Bucket(b) => StorageLocation::Bucket(b.child(rel)),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(root) => write!(f, "{}", root.display()),
            StorageLocation::Bucket(b) => b.fmt(f),
        }
    }
}

fn join_local(root: &Path, rel: &Path) -> PathBuf {
    root.join(rel)
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Used to ensure cleanup on error paths during atomic writes.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Disarm the guard so the file is NOT removed on drop.
    /// Call this after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; we're likely already handling another error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `rel_path` inside `location`, replacing any existing
/// object in a single atomic step.
///
/// Locally this writes a sibling temp file, syncs it, and renames it over the
/// target. On buckets a single put is already all-or-nothing.
pub async fn write_atomic(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_path);

            create_parent_dir(&abs).await?;

            let tmp_path = abs.with_extension("tmp");
            let mut guard = TempFileGuard::new(tmp_path.clone());

            {
                let mut file = fs::File::create(&tmp_path)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;

                file.write_all(contents)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;

                file.sync_all()
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_path.display().to_string(),
                    })?;
            }

            fs::rename(&tmp_path, &abs)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?;

            guard.disarm();

            Ok(())
        }
        StorageLocation::Bucket(b) => b.put(rel_path, contents).await,
    }
}

/// Create a *new* object at `rel_path` and write `contents`, failing with
/// `StorageError::AlreadyExists` if it already exists.
///
/// This is used for commit files and segments, where each name must be
/// written exactly once.
pub async fn write_new(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_path);
            create_parent_dir(&abs).await?;

            let path_str = abs.display().to_string();

            // Atomic "create only if not exists" on the target path.
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&abs)
                .await
                .map_err(|e| classify_local_error(path_str.clone(), e))?;

            file.write_all(contents)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?;

            file.sync_all()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu { path: path_str })?;

            Ok(())
        }
        StorageLocation::Bucket(b) => b.put_new(rel_path, contents).await,
    }
}

/// Read the object at `rel_path` and return its contents as a `String`.
///
/// A missing object is reported as `StorageError::NotFound`.
pub async fn read_to_string(location: &StorageLocation, rel_path: &Path) -> StorageResult<String> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_path);
            fs::read_to_string(&abs)
                .await
                .map_err(|e| classify_local_error(abs.display().to_string(), e))
        }
        StorageLocation::Bucket(b) => {
            let bytes = b.get(rel_path).await?;
            String::from_utf8(bytes).map_err(|e| StorageError::OtherIo {
                path: b.object_path(rel_path).to_string(),
                source: BackendError::Local(io::Error::new(io::ErrorKind::InvalidData, e)),
                backtrace: snafu::Backtrace::capture(),
            })
        }
    }
}

/// Read the full contents of the object at `rel_path`.
///
/// A missing object is reported as `StorageError::NotFound`.
pub async fn read_all_bytes(location: &StorageLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_path);
            fs::read(&abs)
                .await
                .map_err(|e| classify_local_error(abs.display().to_string(), e))
        }
        StorageLocation::Bucket(b) => b.get(rel_path).await,
    }
}

/// Delete the object at `rel_path`. Deleting something that does not exist
/// succeeds.
pub async fn delete(location: &StorageLocation, rel_path: &Path) -> StorageResult<()> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_path);
            match fs::remove_file(&abs).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
                    path: abs.display().to_string(),
                }),
            }
        }
        StorageLocation::Bucket(b) => b.delete(rel_path).await,
    }
}

/// Recursively delete everything under `rel_dir`. A missing directory is not
/// an error.
pub async fn delete_prefix(location: &StorageLocation, rel_dir: &Path) -> StorageResult<()> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_dir);
            match fs::remove_dir_all(&abs).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
                    path: abs.display().to_string(),
                }),
            }
        }
        StorageLocation::Bucket(b) => b.delete_prefix(rel_dir).await,
    }
}

/// Names of the immediate child directories of `rel_dir`, sorted.
///
/// On buckets a "directory" is any common prefix one level below `rel_dir`.
/// A missing directory yields an empty list.
pub async fn list_dirs(location: &StorageLocation, rel_dir: &Path) -> StorageResult<Vec<String>> {
    match location {
        StorageLocation::Local(root) => {
            let abs = join_local(root, rel_dir);
            let path_str = abs.display().to_string();

            let mut entries = match fs::read_dir(&abs).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => {
                    return Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str });
                }
            };

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: path_str.clone(),
                    })?;
                if file_type.is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            Ok(names)
        }
        StorageLocation::Bucket(b) => b.list_dirs(rel_dir).await,
    }
}
