use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    response::{IntoResponse, Response},
    Json,
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    dtos::{
        videos::{
            ClearCacheResponse, DeleteVideoRequest, ListVideosQuery, ListVideosResponse,
            VideoItem, VideoLimitResponse,
        },
        MessageResponse,
    },
    middleware::CurrentUser,
    services::VideoLibrary,
    AppState,
};
use service_core::error::AppError;

fn video_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Video not found or unauthorized"))
}

/// GET /get_videos?page=&limit=
pub async fn list_videos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListVideosQuery>,
) -> Result<Json<ListVideosResponse>, AppError> {
    let (page, limit) = query.normalized();
    let offset = (page - 1).saturating_mul(limit);

    let (videos, total) = state.videos.list_videos(user.id, limit, offset).await?;

    Ok(Json(ListVideosResponse {
        videos: videos.iter().map(VideoItem::from).collect(),
        has_more: total > page.saturating_mul(limit),
        total,
    }))
}

/// DELETE /delete_video
pub async fn delete_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<DeleteVideoRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let filename = req
        .target()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("videoId or filename is required")))?;

    if !VideoLibrary::is_safe_filename(filename) {
        return Err(video_not_found());
    }

    if state.videos.find_video(user.id, filename).await?.is_none() {
        return Err(video_not_found());
    }

    // File first: a failed removal keeps the row so the delete can be retried
    state.library.remove_video(user.id, filename).await?;
    state.videos.delete_video(user.id, filename).await?;
    tracing::info!(user_id = user.id, filename, "Video deleted");

    Ok(Json(MessageResponse::new("Video deleted successfully")))
}

/// GET /video/:filename
///
/// Range requests are handled by `ServeFile`.
pub async fn serve_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(filename): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    let path = state
        .library
        .video_path(user.id, &filename)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid filename")))?;

    if state.videos.find_video(user.id, &filename).await?.is_none() {
        return Err(video_not_found());
    }

    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => Ok(res.map(Body::new).into_response()),
        Err(never) => match never {},
    }
}

/// GET /check_video_limit
pub async fn check_video_limit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<VideoLimitResponse>, AppError> {
    let count = state.videos.count_videos(user.id).await?;
    let limit = state.config.limits.max_videos_per_user;

    Ok(Json(VideoLimitResponse {
        count,
        limit,
        can_generate: count < limit,
    }))
}

/// POST /clear_cache
pub async fn clear_cache(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ClearCacheResponse>, AppError> {
    let files = state.library.clear_user(user.id).await?;
    let rows = state.videos.delete_all_videos(user.id).await?;

    tracing::info!(user_id = user.id, files, rows, "Cleared video cache");

    Ok(Json(ClearCacheResponse {
        message: "Cache cleared successfully".to_string(),
        deleted: files,
    }))
}
