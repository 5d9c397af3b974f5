//! Argument builders for the ffmpeg and ffprobe invocations of a render.

use std::path::Path;

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Font used for captions; ffmpeg's default font when unset
    pub font_file: Option<String>,
}

/// Per-segment visual effect derived from the transition mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentEffect {
    pub fade_in: Option<f64>,
    pub fade_out: Option<f64>,
    /// Seconds the image takes to slide in from the right
    pub slide_in: Option<f64>,
}

pub struct SegmentSpec<'a> {
    pub image: &'a Path,
    pub duration: f64,
    pub caption_file: Option<&'a Path>,
    pub effect: SegmentEffect,
    pub output: &'a Path,
}

pub struct MuxSpec<'a> {
    pub video: &'a Path,
    pub voice: &'a Path,
    pub background: &'a Path,
    pub voice_volume: f64,
    pub background_volume: f64,
    pub duration: f64,
    pub output: &'a Path,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Quote a value for use inside a filter option.
fn quote_filter_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path_arg(path),
    ]
}

pub fn parse_probe_output(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn scale_chain(settings: &RenderSettings) -> String {
    let (w, h) = (settings.width, settings.height);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps={fps}",
        fps = settings.fps
    )
}

fn caption_filter(settings: &RenderSettings, caption_file: &Path) -> String {
    let mut filter = format!(
        "drawtext=textfile={}:fontcolor=white:fontsize=50:borderw=3:bordercolor=black:\
         x=(w-text_w)/2:y=h-text_h-40",
        quote_filter_value(&caption_file.to_string_lossy())
    );
    if let Some(font) = &settings.font_file {
        filter.push_str(&format!(":fontfile={}", quote_filter_value(font)));
    }
    filter
}

/// Filter graph turning input 0 (the still image) into a `[v]` stream.
/// With a slide-in, input 1 is a black canvas the image moves across.
pub fn segment_filter(settings: &RenderSettings, spec: &SegmentSpec<'_>) -> String {
    let mut tail = Vec::new();
    if let Some(caption) = spec.caption_file {
        tail.push(caption_filter(settings, caption));
    }
    if let Some(d) = spec.effect.fade_in.filter(|d| *d > 0.0) {
        tail.push(format!("fade=t=in:st=0:d={}", secs(d)));
    }
    if let Some(d) = spec.effect.fade_out.filter(|d| *d > 0.0) {
        let start = (spec.duration - d).max(0.0);
        tail.push(format!("fade=t=out:st={}:d={}", secs(start), secs(d)));
    }
    tail.push("format=yuv420p".to_string());
    let tail = tail.join(",");

    match spec.effect.slide_in.filter(|d| *d > 0.0) {
        Some(d) => format!(
            "[0:v]{scale}[img];[1:v][img]overlay=x='max(0,main_w-main_w*t/{d})':y=0:shortest=1,{tail}[v]",
            scale = scale_chain(settings),
            d = secs(d),
        ),
        None => format!("[0:v]{},{}[v]", scale_chain(settings), tail),
    }
}

pub fn segment_args(settings: &RenderSettings, spec: &SegmentSpec<'_>) -> Vec<String> {
    let duration = secs(spec.duration);
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        settings.fps.to_string(),
        "-t".into(),
        duration.clone(),
        "-i".into(),
        path_arg(spec.image),
    ];

    if spec.effect.slide_in.is_some_and(|d| d > 0.0) {
        args.extend([
            "-f".into(),
            "lavfi".into(),
            "-t".into(),
            duration.clone(),
            "-i".into(),
            format!(
                "color=c=black:s={}x{}:r={}",
                settings.width, settings.height, settings.fps
            ),
        ]);
    }

    args.extend([
        "-filter_complex".into(),
        segment_filter(settings, spec),
        "-map".into(),
        "[v]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        settings.fps.to_string(),
        "-t".into(),
        duration,
        "-an".into(),
        path_arg(spec.output),
    ]);
    args
}

/// Input list for the concat demuxer.
pub fn concat_list<P: AsRef<Path>>(segments: &[P]) -> String {
    segments
        .iter()
        .map(|p| {
            format!(
                "file '{}'\n",
                p.as_ref().to_string_lossy().replace('\'', r"'\''")
            )
        })
        .collect()
}

pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list_file),
        "-c".into(),
        "copy".into(),
        path_arg(output),
    ]
}

/// Mix the voice with the looped background track and attach it to the video.
pub fn mux_args(spec: &MuxSpec<'_>) -> Vec<String> {
    let duration = secs(spec.duration);
    let filter = format!(
        "[1:a]volume={voice}[voice];[2:a]volume={bg}[bg];\
         [voice][bg]amix=inputs=2:duration=first:dropout_transition=0:normalize=0,\
         atrim=0:{d}[a]",
        voice = spec.voice_volume,
        bg = spec.background_volume,
        d = duration,
    );

    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        path_arg(spec.video),
        "-i".into(),
        path_arg(spec.voice),
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        path_arg(spec.background),
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "[a]".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-t".into(),
        duration,
        "-movflags".into(),
        "+faststart".into(),
        path_arg(spec.output),
    ]
}
