use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

use super::{FileStore, FileStoreError};

/// Local filesystem file store.
pub struct LocalFileStore {
    base_path: PathBuf,
}

impl LocalFileStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        let base_path = base_path.canonicalize()?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !is_plain {
            return Err(FileStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), FileStoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn ensure_directory(&self, key: &str) -> Result<(), FileStoreError> {
        let path = self.object_path(key)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<PathBuf, FileStoreError> {
        let source = self.object_path(from)?;
        let target = self.object_path(to)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(FileStoreError::NotFound(from.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;
        Ok(target)
    }

    async fn delete_file(&self, key: &str) -> Result<(), FileStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_directory_recursive(&self, key: &str) -> Result<(), FileStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, FileStoreError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        self.object_path(key)
    }
}
