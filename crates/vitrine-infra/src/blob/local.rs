//! Object store rooted in a local directory.
//!
//! Object names map to relative paths (`auth/creds.json` becomes
//! `{root}/auth/creds.json`). Useful for development and for keeping a
//! second copy of the credentials on a mounted volume.

use std::path::{Component, Path, PathBuf};

use vitrine_core::storage::ObjectStore;
use vitrine_types::error::StoreError;

#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object name to a path under the root, refusing anything that
    /// would escape it.
    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Every object name under the root, `/`-separated.
    async fn walk(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let name = format!("{prefix}{file_name}");
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{name}/")));
                } else if file_type.is_file() {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

impl ObjectStore for DirectoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .walk()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(name)?).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(tmp.path());

        store.put("auth/creds.json", b"v1").await.unwrap();
        store.put("auth/creds.json", b"v2").await.unwrap();
        store.put("auth/pre-key-1.json", b"k").await.unwrap();
        store.put("other/x.json", b"x").await.unwrap();

        assert_eq!(
            store.get("auth/creds.json").await.unwrap().as_deref(),
            Some(&b"v2"[..])
        );
        assert_eq!(
            store.list("auth/").await.unwrap(),
            vec!["auth/creds.json", "auth/pre-key-1.json"]
        );

        store.delete("auth/creds.json").await.unwrap();
        store.delete("auth/creds.json").await.unwrap();
        assert!(store.get("auth/creds.json").await.unwrap().is_none());
        assert_eq!(store.list("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(tmp.path().join("not-yet"));
        assert!(store.list("auth/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn names_cannot_escape_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(tmp.path());

        for name in ["../evil", "/etc/passwd", "auth/../../x", ""] {
            assert!(
                matches!(store.put(name, b"x").await, Err(StoreError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }
}
