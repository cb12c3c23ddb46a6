//! Object-storage backend.
//!
//! A [`BucketLocation`] pairs an [`ObjectStore`] client with the prefix that
//! plays the role of a local root directory. Relative paths are mapped onto
//! object keys component by component, so the same relative layout works on
//! both backends.

use std::{
    fmt,
    path::{Component, Path},
    sync::Arc,
};

use futures::TryStreamExt;
use object_store::{
    ObjectStore, PutMode, PutOptions, PutPayload,
    aws::{AmazonS3Builder, S3ConditionalPut},
    memory::InMemory,
    path::Path as ObjectPath,
};
use snafu::prelude::*;

use super::{InvalidLocationSnafu, StorageResult, error::classify_object_error};

/// Which object-storage service a bucket locator refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketScheme {
    /// Amazon S3 (or an S3-compatible endpoint configured via `AWS_*`).
    S3,
    /// A process-local in-memory store.
    Memory,
}

impl BucketScheme {
    pub(crate) fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "s3" | "s3a" => Some(BucketScheme::S3),
            "memory" | "mem" => Some(BucketScheme::Memory),
            _ => None,
        }
    }

    /// Canonical URL scheme.
    pub fn as_str(self) -> &'static str {
        match self {
            BucketScheme::S3 => "s3",
            BucketScheme::Memory => "memory",
        }
    }
}

/// A prefix inside an object-storage bucket.
#[derive(Clone, Debug)]
pub struct BucketLocation {
    scheme: BucketScheme,
    bucket: String,
    prefix: ObjectPath,
    store: Arc<dyn ObjectStore>,
}

impl BucketLocation {
    /// Fresh in-memory bucket with an empty prefix.
    pub fn in_memory(bucket: &str) -> Self {
        BucketLocation {
            scheme: BucketScheme::Memory,
            bucket: bucket.to_string(),
            prefix: ObjectPath::default(),
            store: Arc::new(InMemory::new()),
        }
    }

    /// Parse the part of a locator after `<scheme>://`.
    pub(crate) fn parse(spec: &str, scheme: BucketScheme, rest: &str) -> StorageResult<Self> {
        let rest = rest.trim_matches('/');
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        ensure!(
            !bucket.is_empty(),
            InvalidLocationSnafu {
                spec,
                reason: "bucket name is empty",
            }
        );

        let prefix = ObjectPath::parse(prefix).map_err(|e| {
            InvalidLocationSnafu {
                spec,
                reason: format!("invalid prefix: {e}"),
            }
            .build()
        })?;

        let store: Arc<dyn ObjectStore> = match scheme {
            BucketScheme::Memory => Arc::new(InMemory::new()),
            BucketScheme::S3 => {
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_conditional_put(S3ConditionalPut::ETagMatch)
                    .build()
                    .map_err(|e| {
                        InvalidLocationSnafu {
                            spec,
                            reason: e.to_string(),
                        }
                        .build()
                    })?;
                Arc::new(s3)
            }
        };

        Ok(BucketLocation {
            scheme,
            bucket: bucket.to_string(),
            prefix,
            store,
        })
    }

    /// Which service this bucket lives on.
    pub fn scheme(&self) -> BucketScheme {
        self.scheme
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Prefix acting as the root of this location.
    pub fn prefix(&self) -> &ObjectPath {
        &self.prefix
    }

    pub(crate) fn child(&self, rel: &Path) -> Self {
        BucketLocation {
            prefix: self.object_path(rel),
            ..self.clone()
        }
    }

    /// Object key for `rel` under this location's prefix.
    pub(crate) fn object_path(&self, rel: &Path) -> ObjectPath {
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .fold(self.prefix.clone(), |acc, part| acc.child(part))
    }

    pub(crate) async fn put(&self, rel: &Path, contents: &[u8]) -> StorageResult<()> {
        let path = self.object_path(rel);
        self.store
            .put(&path, PutPayload::from(contents.to_vec()))
            .await
            .map_err(|e| classify_object_error(path.to_string(), e))?;
        Ok(())
    }

    pub(crate) async fn put_new(&self, rel: &Path, contents: &[u8]) -> StorageResult<()> {
        let path = self.object_path(rel);
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        self.store
            .put_opts(&path, PutPayload::from(contents.to_vec()), opts)
            .await
            .map_err(|e| classify_object_error(path.to_string(), e))?;
        Ok(())
    }

    pub(crate) async fn get(&self, rel: &Path) -> StorageResult<Vec<u8>> {
        let path = self.object_path(rel);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| classify_object_error(path.to_string(), e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| classify_object_error(path.to_string(), e))?;
        Ok(bytes.to_vec())
    }

    pub(crate) async fn delete(&self, rel: &Path) -> StorageResult<()> {
        let path = self.object_path(rel);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(classify_object_error(path.to_string(), e)),
        }
    }

    pub(crate) async fn delete_prefix(&self, rel_dir: &Path) -> StorageResult<()> {
        let prefix = self.object_path(rel_dir);
        let objects: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| classify_object_error(prefix.to_string(), e))?;

        for meta in objects {
            match self.store.delete(&meta.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(classify_object_error(meta.location.to_string(), e)),
            }
        }
        Ok(())
    }

    pub(crate) async fn list_dirs(&self, rel_dir: &Path) -> StorageResult<Vec<String>> {
        let prefix = self.object_path(rel_dir);
        let listing = self
            .store
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|e| classify_object_error(prefix.to_string(), e))?;

        let mut names: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.bucket)?;
        if !self.prefix.as_ref().is_empty() {
            write!(f, "/{}", self.prefix)?;
        }
        Ok(())
    }
}
