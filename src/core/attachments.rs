//! On-disk storage for files delivered alongside a webhook (thumbnails).

use std::path::{Path, PathBuf};

use tokio::fs;

use super::activity_store::StoreError;

/// Stores thumbnails as `<dir>/<request-id><ext>`
#[derive(Debug, Clone)]
pub struct ThumbStore {
    dir: PathBuf,
}

impl ThumbStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a thumbnail and return the path it was stored at.
    ///
    /// The extension is taken from the uploaded file name, if it has one.
    pub async fn store(
        &self,
        request_id: &str,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(format!("{}{}", request_id, extension_of(original_name)));
        fs::write(&path, bytes).await?;

        Ok(path)
    }

    /// Delete a stored thumbnail; a file that is already gone is not an error
    pub async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `.jpg` for `poster.jpg`; empty when there is no usable extension
fn extension_of(name: Option<&str>) -> String {
    name.map(Path::new)
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}
