//! Per-user output folders for rendered videos.

use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VideoLibrary {
    base: PathBuf,
}

impl VideoLibrary {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.base.join(format!("user_{}", user_id))
    }

    pub async fn ensure_user_dir(&self, user_id: i64) -> io::Result<PathBuf> {
        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// `video_YYYYMMDD_HHMMSS_<8 hex>.mp4`
    pub fn generate_filename(now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("video_{}_{}.mp4", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
    }

    /// Plain file names only: no separators, no traversal, no hidden files.
    pub fn is_safe_filename(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }

    /// Path of `filename` inside the user's folder, or `None` for unsafe names.
    pub fn video_path(&self, user_id: i64, filename: &str) -> Option<PathBuf> {
        Self::is_safe_filename(filename).then(|| self.user_dir(user_id).join(filename))
    }

    /// Returns false when the file was already gone.
    pub async fn remove_video(&self, user_id: i64, filename: &str) -> io::Result<bool> {
        let Some(path) = self.video_path(user_id, filename) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Video file already missing");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every file in the user's folder and return how many were removed.
    pub async fn clear_user(&self, user_id: i64) -> io::Result<u64> {
        let dir = self.user_dir(user_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
