use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const DIAGNOSIS_DIR: &str = "diagnoses";

/// Writes uploaded images below the media root
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a diagnosis image; returns the path relative to the media root
    pub async fn save_diagnosis_image(&self, data: &[u8]) -> Result<String> {
        let extension = infer::get(data)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.extension())
            .unwrap_or("bin");

        let relative = format!("{}/{}.{}", DIAGNOSIS_DIR, Uuid::new_v4(), extension);
        let full_path = self.root.join(&relative);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create media directory {}", parent.display()))?;
        }

        tokio::fs::write(&full_path, data)
            .await
            .with_context(|| format!("Failed to write image {}", full_path.display()))?;

        info!("Stored diagnosis image {} ({} bytes)", relative, data.len());
        Ok(relative)
    }
}
