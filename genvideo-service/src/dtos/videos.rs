use serde::{Deserialize, Serialize};

use crate::models::Video;

pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct ListVideosQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListVideosQuery {
    /// `(page, limit)` with page >= 1 and limit within 1..=MAX_PAGE_SIZE.
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub duration: f64,
}

impl From<&Video> for VideoItem {
    fn from(video: &Video) -> Self {
        Self {
            video_id: video.filename.clone(),
            title: video.title().to_string(),
            url: format!("/video/{}", video.filename),
            created_at: video.created_at.to_rfc3339(),
            duration: video.duration,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideosResponse {
    pub videos: Vec<VideoItem>,
    pub has_more: bool,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVideoRequest {
    /// Same value as `filename`; both names are accepted
    pub video_id: Option<String>,
    pub filename: Option<String>,
}

impl DeleteVideoRequest {
    pub fn target(&self) -> Option<&str> {
        self.video_id
            .as_deref()
            .or(self.filename.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaTokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoLimitResponse {
    pub count: i64,
    pub limit: i64,
    pub can_generate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoLimitExceeded {
    pub error: String,
    pub message: String,
    pub video_count: i64,
    pub limit: i64,
}

impl VideoLimitExceeded {
    pub fn new(video_count: i64, limit: i64) -> Self {
        Self {
            error: "Video limit reached".to_string(),
            message: format!(
                "You have reached the maximum limit of {} videos. \
                 Please delete some videos before generating new ones.",
                limit
            ),
            video_count,
            limit,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    pub message: String,
    pub video_url: String,
    pub filename: String,
    pub video_count: i64,
    pub limit: i64,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub deleted: u64,
}
