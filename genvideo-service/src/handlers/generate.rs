//! Slideshow generation from a multipart upload.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    dtos::videos::{GenerateVideoResponse, VideoLimitExceeded},
    media::{plan_slides, ImageOrder, RenderJob, SlideTiming, Transition},
    middleware::CurrentUser,
    models::{NewVideo, User},
    services::{metrics, VideoLibrary},
    AppState,
};
use service_core::error::AppError;

/// Parsed upload. Files are already on disk inside the request's scratch directory.
#[derive(Debug, Default)]
struct GenerateForm {
    images: Vec<PathBuf>,
    voice: Option<PathBuf>,
    background: Option<PathBuf>,
    captions: Vec<String>,
    fields: HashMap<String, String>,
}

/// Render options after defaults and validation.
#[derive(Debug, Clone, PartialEq)]
struct RenderOptions {
    min_time: f64,
    max_time: f64,
    order: ImageOrder,
    transition: Transition,
    transition_time: f64,
    voice_volume: f64,
    background_volume: f64,
}

impl RenderOptions {
    fn from_fields(fields: &HashMap<String, String>, fps: u32) -> Result<Self, AppError> {
        let options = Self {
            min_time: number_field(fields, "minTime", 3.0)?,
            max_time: number_field(fields, "maxTime", 5.0)?,
            order: enum_field(fields, "imageSelection")?,
            transition: enum_field(fields, "transitionType")?,
            transition_time: number_field(fields, "transitionTime", 0.5)?,
            voice_volume: number_field(fields, "voiceVolume", 1.0)?,
            background_volume: number_field(fields, "backgroundVolume", 0.3)?,
        };

        if options.min_time <= 0.0 {
            return Err(bad_request("minTime must be greater than 0"));
        }
        let frame = 1.0 / f64::from(fps.max(1));
        if options.min_time < frame {
            return Err(bad_request(format!(
                "minTime must be at least one frame ({:.3}s)",
                frame
            )));
        }
        if options.max_time < options.min_time {
            return Err(bad_request("maxTime must be greater than or equal to minTime"));
        }
        if options.transition_time < 0.0 {
            return Err(bad_request("transitionTime cannot be negative"));
        }
        if options.voice_volume < 0.0 || options.background_volume < 0.0 {
            return Err(bad_request("Volumes cannot be negative"));
        }

        Ok(options)
    }
}

fn bad_request(message: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(anyhow::anyhow!("{}", message))
}

fn number_field(
    fields: &HashMap<String, String>,
    name: &str,
    default: f64,
) -> Result<f64, AppError> {
    match fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| bad_request(format!("Invalid {}: {}", name, raw))),
    }
}

fn enum_field<T>(fields: &HashMap<String, String>, name: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String> + Default,
{
    match fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(T::default()),
        Some(raw) => raw.parse::<T>().map_err(bad_request),
    }
}

/// Keep a short alphanumeric extension so ffmpeg sees a familiar name.
fn upload_name(prefix: &str, index: usize, original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}_{}.{}", prefix, index, ext)
}

async fn save_field(mut field: Field<'_>, path: &Path) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

async fn read_form(mut multipart: Multipart, work_dir: &Path) -> Result<GenerateForm, AppError> {
    let mut form = GenerateForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "images" | "images[]" => {
                let path = work_dir.join(upload_name("image", form.images.len(), field.file_name()));
                save_field(field, &path).await?;
                form.images.push(path);
            }
            "voice" => {
                let path = work_dir.join(upload_name("voice", 0, field.file_name()));
                save_field(field, &path).await?;
                form.voice = Some(path);
            }
            "backgroundSound" => {
                let path = work_dir.join(upload_name("background", 0, field.file_name()));
                save_field(field, &path).await?;
                form.background = Some(path);
            }
            "textOverlays" | "textOverlays[]" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Invalid textOverlays: {}", e)))?;
                form.captions.push(text);
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Invalid {}: {}", name, e)))?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

fn limit_reached(count: i64, limit: i64) -> Response {
    (StatusCode::FORBIDDEN, Json(VideoLimitExceeded::new(count, limit))).into_response()
}

/// POST /generate_video
pub async fn generate_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let limit = state.config.limits.max_videos_per_user;
    let count = state.videos.count_videos(user.id).await?;
    if count >= limit {
        tracing::info!(user_id = user.id, count, limit, "Video limit reached");
        return Ok(limit_reached(count, limit));
    }

    let work_dir = state
        .config
        .media
        .work_folder
        .join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&work_dir).await?;

    let result = generate_in(&state, &user, multipart, &work_dir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        tracing::warn!(error = %e, work_dir = %work_dir.display(), "Failed to remove scratch directory");
    }

    result
}

async fn generate_in(
    state: &AppState,
    user: &User,
    multipart: Multipart,
    work_dir: &Path,
) -> Result<Response, AppError> {
    let form = read_form(multipart, work_dir).await?;

    if form.images.is_empty() {
        return Err(bad_request("At least one image is required"));
    }
    let voice = form
        .voice
        .ok_or_else(|| bad_request("Voice file is required"))?;
    let background = form
        .background
        .ok_or_else(|| bad_request("Background sound file is required"))?;

    let fps = state.config.media.video_fps;
    let options = RenderOptions::from_fields(&form.fields, fps)?;

    let duration = state.renderer.probe_duration(&voice).await?;

    let slides = {
        let mut rng = rand::thread_rng();
        plan_slides(
            duration,
            form.images.len(),
            options.order,
            SlideTiming::new(options.min_time, options.max_time, fps),
            &form.captions,
            &mut rng,
        )?
    };

    let filename = VideoLibrary::generate_filename(Utc::now());
    let output = state.library.ensure_user_dir(user.id).await?.join(&filename);

    let job = RenderJob {
        work_dir: work_dir.to_path_buf(),
        images: form.images,
        voice,
        background,
        slides,
        transition: options.transition,
        transition_time: options.transition_time,
        voice_volume: options.voice_volume,
        background_volume: options.background_volume,
        duration,
        output,
    };

    let started = Instant::now();
    if let Err(e) = state.renderer.render(&job).await {
        metrics::record_render("failed", started.elapsed());
        if let Err(cleanup) = tokio::fs::remove_file(&job.output).await {
            tracing::debug!(error = %cleanup, "No partial output to remove");
        }
        return Err(e.into());
    }
    metrics::record_render("success", started.elapsed());

    let new_video = NewVideo {
        user_id: user.id,
        filename: filename.clone(),
        duration,
    };

    let limit = state.config.limits.max_videos_per_user;
    if state
        .videos
        .insert_video_within_limit(&new_video, limit)
        .await?
        .is_none()
    {
        state.library.remove_video(user.id, &filename).await?;
        let count = state.videos.count_videos(user.id).await?;
        tracing::info!(user_id = user.id, count, limit, "Video limit reached during render");
        return Ok(limit_reached(count, limit));
    }

    let video_count = state.videos.count_videos(user.id).await?;
    tracing::info!(
        user_id = user.id,
        filename = %filename,
        duration,
        slides = job.slides.len(),
        "Video generated"
    );

    Ok(Json(GenerateVideoResponse {
        message: "Video generated successfully".to_string(),
        video_url: format!("/video/{}", filename),
        filename,
        video_count,
        limit,
        duration,
    })
    .into_response())
}
