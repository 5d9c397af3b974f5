//! Slideshow rendering: slide planning, ffmpeg command construction and the
//! renderer that drives them.

pub mod executor;
pub mod ffmpeg;
pub mod plan;
pub mod renderer;

pub use executor::CommandExecutor;
pub use plan::{plan_slides, ImageOrder, PlanError, Slide, SlideTiming, Transition};
pub use renderer::{FfmpegRenderer, RenderJob, Renderer};

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media command timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("Could not read duration of {0}")]
    UnreadableMedia(String),

    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render queue closed")]
    QueueClosed,
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnreadableMedia(name) => AppError::BadRequest(anyhow::anyhow!(
                "Could not read audio duration of {}",
                name
            )),
            other => AppError::InternalError(anyhow::anyhow!("Video rendering failed: {}", other)),
        }
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        AppError::BadRequest(anyhow::anyhow!(err))
    }
}
