//! Scratch storage for fetched page assets.
//!
//! Every document gets its own directory under the configured scratch root,
//! so pages kept around for `skip_existing` are never mistaken for pages of
//! another document. Removal is loud: the first file that cannot be deleted
//! aborts cleanup with [`FlipbookError::Cleanup`].

use crate::error::FlipbookError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A per-document scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
    path: PathBuf,
}

impl ScratchDir {
    /// Create (if needed) `<root>/<name>/`.
    pub async fn create(root: &Path, name: &str) -> Result<Self, FlipbookError> {
        let path = root.join(name);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| FlipbookError::ScratchDir {
                path: path.clone(),
                source: e,
            })?;
        debug!("Scratch directory ready: {}", path.display());
        Ok(Self {
            root: root.to_path_buf(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File path for page `index` with extension `ext`.
    pub fn page_path(&self, index: usize, ext: &str) -> PathBuf {
        self.path.join(format!("page_{index}.{ext}"))
    }

    /// Remove every file in the directory, then the directory itself.
    ///
    /// The scratch root is removed too when nothing else is left in it.
    pub async fn remove(self) -> Result<(), FlipbookError> {
        info!("Cleaning up {}", self.path.display());

        let cleanup_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| FlipbookError::Cleanup { path, source }
        };

        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(cleanup_err(&self.path))?;
        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(cleanup_err(&self.path))?
        {
            let file = entry.path();
            tokio::fs::remove_file(&file)
                .await
                .map_err(cleanup_err(&file))?;
            removed += 1;
        }

        tokio::fs::remove_dir(&self.path)
            .await
            .map_err(cleanup_err(&self.path))?;
        debug!("Removed {} scratch files", removed);

        // Other documents may still own directories under the root.
        if is_empty_dir(&self.root).await {
            tokio::fs::remove_dir(&self.root)
                .await
                .map_err(cleanup_err(&self.root))?;
        }
        Ok(())
    }
}

async fn is_empty_dir(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
