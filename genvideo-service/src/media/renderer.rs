use crate::media::executor::CommandExecutor;
use crate::media::ffmpeg::{self, MuxSpec, RenderSettings, SegmentEffect, SegmentSpec};
use crate::media::plan::{Slide, Transition};
use crate::media::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything needed to render one slideshow. All paths live in a scratch
/// directory owned by the request, except `output`.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub work_dir: PathBuf,
    /// Uploaded images in upload order; slides refer to them by index
    pub images: Vec<PathBuf>,
    pub voice: PathBuf,
    pub background: PathBuf,
    pub slides: Vec<Slide>,
    pub transition: Transition,
    pub transition_time: f64,
    pub voice_volume: f64,
    pub background_volume: f64,
    /// Voice duration in seconds; the output is trimmed to it
    pub duration: f64,
    pub output: PathBuf,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Length of an audio file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    async fn render(&self, job: &RenderJob) -> Result<(), MediaError>;
}

/// Effects for slide `index` of `count`.
pub fn segment_effect(
    transition: Transition,
    transition_time: f64,
    index: usize,
    count: usize,
    duration: f64,
) -> SegmentEffect {
    let length = transition_time.min(duration / 2.0);
    if length <= 0.0 {
        return SegmentEffect::default();
    }

    match transition {
        Transition::Fade => SegmentEffect {
            fade_in: (index > 0).then_some(length),
            fade_out: (index + 1 < count).then_some(length),
            slide_in: None,
        },
        Transition::Slide => SegmentEffect {
            slide_in: (index > 0).then_some(length),
            ..SegmentEffect::default()
        },
        Transition::None => SegmentEffect::default(),
    }
}

#[derive(Clone)]
pub struct FfmpegRenderer {
    executor: CommandExecutor,
    ffmpeg_path: String,
    ffprobe_path: String,
    settings: RenderSettings,
    permits: Arc<Semaphore>,
}

impl FfmpegRenderer {
    pub fn new(
        executor: CommandExecutor,
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        settings: RenderSettings,
        max_concurrent: usize,
    ) -> Self {
        Self {
            executor,
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            settings,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    async fn render_segments(&self, job: &RenderJob) -> Result<Vec<PathBuf>, MediaError> {
        let count = job.slides.len();
        let mut segments = Vec::with_capacity(count);

        for (i, slide) in job.slides.iter().enumerate() {
            let image = job.images.get(slide.image_index).ok_or_else(|| {
                MediaError::UnreadableMedia(format!("image #{}", slide.image_index))
            })?;

            let caption_file = match &slide.caption {
                Some(text) => {
                    let path = job.work_dir.join(format!("caption_{:04}.txt", i));
                    tokio::fs::write(&path, text).await?;
                    Some(path)
                }
                None => None,
            };

            let output = job.work_dir.join(format!("segment_{:04}.mp4", i));
            let spec = SegmentSpec {
                image,
                duration: slide.duration,
                caption_file: caption_file.as_deref(),
                effect: segment_effect(job.transition, job.transition_time, i, count, slide.duration),
                output: &output,
            };

            self.executor
                .execute(&self.ffmpeg_path, &ffmpeg::segment_args(&self.settings, &spec))
                .await?;
            segments.push(output);
        }

        Ok(segments)
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let output = self
            .executor
            .execute(&self.ffprobe_path, &ffmpeg::probe_args(path))
            .await
            .map_err(|e| match e {
                MediaError::CommandFailed { .. } => {
                    MediaError::UnreadableMedia(display_name(path))
                }
                other => other,
            })?;

        ffmpeg::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| MediaError::UnreadableMedia(display_name(path)))
    }

    #[tracing::instrument(skip(self, job), fields(slides = job.slides.len(), duration = job.duration))]
    async fn render(&self, job: &RenderJob) -> Result<(), MediaError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MediaError::QueueClosed)?;

        let segments = self.render_segments(job).await?;

        let list_file = job.work_dir.join("segments.txt");
        tokio::fs::write(&list_file, ffmpeg::concat_list(&segments)).await?;

        let slideshow = job.work_dir.join("slideshow.mp4");
        self.executor
            .execute(&self.ffmpeg_path, &ffmpeg::concat_args(&list_file, &slideshow))
            .await?;

        self.executor
            .execute(
                &self.ffmpeg_path,
                &ffmpeg::mux_args(&MuxSpec {
                    video: &slideshow,
                    voice: &job.voice,
                    background: &job.background,
                    voice_volume: job.voice_volume,
                    background_volume: job.background_volume,
                    duration: job.duration,
                    output: &job.output,
                }),
            )
            .await?;

        tracing::info!(output = %job.output.display(), "Video rendered");
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
