//! Local filesystem [`FileSource`] backed by `tokio::fs`.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::contract::{Entry, EntryKind, FileSource};
use crate::error::TransferError;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

impl LocalFileSource {
    pub fn new() -> Self {
        Self
    }

    /// Classifies a user-supplied path as file or directory.
    pub async fn entry(path: impl AsRef<Path>) -> std::io::Result<Entry> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        Ok(if metadata.is_dir() {
            Entry::directory(path)
        } else {
            Entry::file(path)
        })
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn list_directory(&self, entry: &Entry) -> Result<Vec<Entry>, TransferError> {
        let mut reader = tokio::fs::read_dir(&entry.path).await?;
        let mut children = Vec::new();
        while let Some(child) = reader.next_entry().await? {
            let path = child.path();
            // Follows symlinks; dangling links read as plain files and fail later.
            let kind = match tokio::fs::metadata(&path).await {
                Ok(m) if m.is_dir() => EntryKind::Directory,
                _ => EntryKind::File,
            };
            children.push(Entry { path, kind });
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(path = %entry.path.display(), count = children.len(), "Read directory");
        Ok(children)
    }

    async fn read_file(&self, entry: &Entry) -> Result<Vec<u8>, TransferError> {
        Ok(tokio::fs::read(&entry.path).await?)
    }

    async fn read_prefix(&self, entry: &Entry, len: usize) -> Result<Vec<u8>, TransferError> {
        let file = tokio::fs::File::open(&entry.path).await?;
        let mut bytes = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}
