use anyhow::{Context, Result};
use axum::extract::multipart::Field;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Directory holding uploaded video files, served under `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))
    }

    /// Streams a multipart file part to `<millis>-<original name>` and
    /// returns the stored file name. A partially written file is removed.
    pub async fn store_field(&self, mut field: Field<'_>) -> Result<String> {
        let original = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("clip-{}", uuid::Uuid::new_v4()));
        let (file, stored_name) = self.create(&original).await?;

        match write_field(file, &mut field).await {
            Ok(written) => {
                tracing::info!(file = %stored_name, bytes = written, "Stored upload");
                Ok(stored_name)
            }
            Err(e) => {
                self.remove(&stored_name).await;
                Err(e.context(format!("Failed to write {}", stored_name)))
            }
        }
    }

    /// Deletes a stored upload that no clip will reference.
    pub async fn remove(&self, stored_name: &str) {
        let path = self.dir.join(stored_name);
        match fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(file = %stored_name, "Removed orphaned upload"),
            Err(e) => tracing::warn!(file = %stored_name, error = %e, "Failed to remove orphaned upload"),
        }
    }

    /// Opens the destination file for a new upload.
    pub async fn create(&self, original_name: &str) -> Result<(File, String)> {
        let stored_name = stored_file_name(Utc::now().timestamp_millis(), original_name);
        let path = self.dir.join(&stored_name);
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok((file, stored_name))
    }
}

async fn write_field(mut file: File, field: &mut Field<'_>) -> Result<usize> {
    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .context("Failed to read uploaded file")?
    {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

/// Only the final path component of the client's name is kept.
fn stored_file_name(now_millis: i64, original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("clip");
    format!("{}-{}", now_millis, base)
}
