//! Credential bridge: mirrors the local credential directory to and from a
//! remote object store.
//!
//! Local layout is one file per credential blob inside `local_dir`. Remote
//! layout is `{prefix}/{file_name}`. The bridge has no opinion about the
//! content of the blobs.

use std::path::{Path, PathBuf};

use tracing::debug;
use vitrine_types::credential::CredentialSet;
use vitrine_types::error::StoreError;

use crate::fs::FileSystem;
use crate::storage::object_store::ObjectStore;

/// Mirrors a local credential directory through an [`ObjectStore`].
pub struct CredentialBridge<S, F> {
    store: S,
    fs: F,
    local_dir: PathBuf,
    prefix: String,
}

impl<S: ObjectStore, F: FileSystem> CredentialBridge<S, F> {
    pub fn new(store: S, fs: F, local_dir: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            store,
            fs,
            local_dir,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Remote object name for a credential file.
    fn object_name(&self, file_name: &str) -> String {
        if self.prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.prefix, file_name)
        }
    }

    /// Prefix used to list this bridge's objects.
    fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Download every remote credential file into the local directory.
    ///
    /// Returns the number of files written. An empty remote is not an error:
    /// it means a fresh credential scan will be needed.
    pub async fn hydrate(&self) -> Result<usize, StoreError> {
        let list_prefix = self.list_prefix();
        let names = self.store.list(&list_prefix).await?;

        let mut written = 0;
        for name in names {
            let Some(file_name) = name.strip_prefix(&list_prefix) else {
                continue;
            };
            // Nested objects belong to some other layout.
            if validate_file_name(file_name).is_err() {
                debug!(object = %name, "skipping object outside credential layout");
                continue;
            }
            let Some(data) = self.store.get(&name).await? else {
                continue;
            };
            self.fs
                .write_bytes(&self.local_dir.join(file_name), &data)
                .await?;
            written += 1;
        }

        debug!(files = written, dir = %self.local_dir.display(), "hydrated credentials");
        Ok(written)
    }

    /// Read the whole local credential set.
    pub async fn load_local(&self) -> Result<CredentialSet, StoreError> {
        let mut set = CredentialSet::new();
        for file_name in self.fs.list_files(&self.local_dir).await? {
            let data = self.fs.read_bytes(&self.local_dir.join(&file_name)).await?;
            set.insert(file_name, data);
        }
        Ok(set)
    }

    /// Write changed credential blobs to the local directory.
    pub async fn persist_local(&self, update: &CredentialSet) -> Result<(), StoreError> {
        for (file_name, data) in update.iter() {
            validate_file_name(file_name)?;
            self.fs
                .write_bytes(&self.local_dir.join(file_name), data)
                .await?;
        }
        Ok(())
    }

    /// Upload the whole local credential set, overwriting remote copies.
    ///
    /// Returns the number of files uploaded.
    pub async fn mirror(&self) -> Result<usize, StoreError> {
        let set = self.load_local().await?;
        for (file_name, data) in set.iter() {
            self.store.put(&self.object_name(file_name), data).await?;
        }
        debug!(files = set.len(), "mirrored credentials");
        Ok(set.len())
    }

    /// Delete the local credential directory.
    pub async fn purge_local(&self) -> Result<(), StoreError> {
        if self.fs.exists(&self.local_dir).await {
            self.fs.remove_dir_all(&self.local_dir).await?;
        }
        Ok(())
    }

    /// Delete every remote credential object. Returns the number deleted.
    pub async fn purge_remote(&self) -> Result<usize, StoreError> {
        let names = self.store.list(&self.list_prefix()).await?;
        for name in &names {
            self.store.delete(name).await?;
        }
        Ok(names.len())
    }
}

/// Credential file names are single path components.
fn validate_file_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
