//! Filesystem [`ImageSource`] rooted at the workspace image directory.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use smartdoc_core::vision::ImageSource;

pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `image_ref` under the root. References must be relative and
    /// may not climb out of the root.
    pub fn resolve(&self, image_ref: &str) -> Result<PathBuf> {
        let rel = Path::new(image_ref);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("image reference must be a relative path inside the image directory: {}", image_ref);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn load(&self, image_ref: &str) -> Result<Vec<u8>> {
        let path = self.resolve(image_ref)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))
    }
}
