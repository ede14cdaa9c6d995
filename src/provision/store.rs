//! Local storage for downloaded driver artifacts.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A flat directory of artifact files.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Lists the file names currently present.
    async fn list(&self) -> Result<Vec<String>>;

    /// Writes a file, replacing any previous content, and returns its path.
    async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Removes a file. Removing a missing file is not an error.
    async fn remove(&self, file_name: &str) -> Result<()>;

    /// Returns the path a file name maps to.
    fn path_of(&self, file_name: &str) -> PathBuf;
}

/// `ArtifactStore` backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write next to the target, then rename, so a partial download never
        // looks like an installed artifact.
        let final_path = self.path_of(file_name);
        let part_path = self.dir.join(format!(".{file_name}.part"));
        tokio::fs::write(&part_path, bytes).await?;
        tokio::fs::rename(&part_path, &final_path).await?;
        Ok(final_path)
    }

    async fn remove(&self, file_name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_of(file_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}
