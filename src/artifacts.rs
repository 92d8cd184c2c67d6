//! Disk-backed implementation of the [`ArtifactStore`] contract.
//!
//! Reseed bundles are uploaded by the checker out of band; this store only
//! answers whether one exists for a server and serves its bytes.

use crate::core::{artifact_key, ArtifactStore};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

pub struct DiskArtifacts {
    directory: Option<PathBuf>,
    public_base: String,
}

impl DiskArtifacts {
    pub fn new(directory: Option<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            directory,
            public_base: public_base.into(),
        }
    }

    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let directory = self.directory.as_ref()?;
        // Keys are single path segments; anything else is not a valid key.
        let candidate = Path::new(key);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(directory.join(candidate)),
            _ => None,
        }
    }
}

#[async_trait]
impl ArtifactStore for DiskArtifacts {
    fn download_url(&self, server_name: &str) -> Option<String> {
        let key = artifact_key(server_name);
        let path = self.resolve(&key)?;
        path.is_file()
            .then(|| format!("{}/{}", self.public_base.trim_end_matches('/'), key))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.resolve(key) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
