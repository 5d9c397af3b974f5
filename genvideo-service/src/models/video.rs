use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Video {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    /// Seconds; equals the voice track length the video was rendered against
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

impl Video {
    /// Filename without its extension, shown as the video title.
    pub fn title(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub user_id: i64,
    pub filename: String,
    pub duration: f64,
}
