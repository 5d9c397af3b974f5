//! Slide planning: how long each image stays on screen and in which order.

use rand::seq::SliceRandom;
use rand::Rng;
use std::str::FromStr;

/// Remaining time below this is treated as zero.
const EPS: f64 = 1e-6;

/// Upper bound on slides per render; each one is a separate encoder run.
pub const MAX_SLIDES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOrder {
    /// Upload order
    #[default]
    Ascending,
    Descending,
    /// Shuffled once per render
    Random,
}

impl FromStr for ImageOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ascending" => Ok(ImageOrder::Ascending),
            "descending" => Ok(ImageOrder::Descending),
            "random" => Ok(ImageOrder::Random),
            other => Err(format!("Invalid imageSelection: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Fade,
    Slide,
    None,
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fade" => Ok(Transition::Fade),
            "slide" => Ok(Transition::Slide),
            "none" => Ok(Transition::None),
            other => Err(format!("Invalid transitionType: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    /// Index into the uploaded images
    pub image_index: usize,
    pub duration: f64,
    pub caption: Option<String>,
}

/// Bounds on a slide's length. `frame` is the shortest slide the encoder can
/// produce; every slide but the last is a whole number of frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideTiming {
    pub min: f64,
    pub max: f64,
    pub frame: f64,
}

impl SlideTiming {
    pub fn new(min: f64, max: f64, fps: u32) -> Self {
        Self {
            min,
            max,
            frame: 1.0 / f64::from(fps.max(1)),
        }
    }

    fn whole_frames(&self, seconds: f64) -> f64 {
        ((seconds / self.frame).round() * self.frame).max(self.frame)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("At least one image is required")]
    NoImages,

    #[error("Voice track has no measurable duration")]
    EmptyTrack,

    #[error("Slide durations must satisfy one frame <= minTime <= maxTime")]
    InvalidRange,

    #[error("minTime is too short for this voice track: at most 500 slides are allowed")]
    TooManySlides,
}

/// Image indices in display order, one entry per uploaded image.
pub fn image_sequence<R: Rng + ?Sized>(count: usize, order: ImageOrder, rng: &mut R) -> Vec<usize> {
    let mut sequence: Vec<usize> = (0..count).collect();
    match order {
        ImageOrder::Ascending => {}
        ImageOrder::Descending => sequence.reverse(),
        ImageOrder::Random => sequence.shuffle(rng),
    }
    sequence
}

/// Cover `total` seconds with slides of random length in `[min, max]`, cycling
/// through the images. The last slide is clipped so the durations sum to `total`;
/// a remainder shorter than one frame is folded into the slide before it.
pub fn plan_slides<R: Rng + ?Sized>(
    total: f64,
    image_count: usize,
    order: ImageOrder,
    timing: SlideTiming,
    captions: &[String],
    rng: &mut R,
) -> Result<Vec<Slide>, PlanError> {
    if image_count == 0 {
        return Err(PlanError::NoImages);
    }
    if !(timing.frame > 0.0 && timing.frame.is_finite()) {
        return Err(PlanError::InvalidRange);
    }
    if !total.is_finite() || total < timing.frame {
        return Err(PlanError::EmptyTrack);
    }
    if !(timing.min >= timing.frame && timing.min <= timing.max && timing.max.is_finite()) {
        return Err(PlanError::InvalidRange);
    }
    if total / timing.min > MAX_SLIDES as f64 {
        return Err(PlanError::TooManySlides);
    }

    let sequence = image_sequence(image_count, order, rng);
    let mut slides: Vec<Slide> = Vec::new();
    let mut elapsed = 0.0;

    while total - elapsed > EPS {
        let remaining = total - elapsed;
        let duration = timing
            .whole_frames(rng.gen_range(timing.min..=timing.max))
            .min(remaining);

        if duration < timing.frame {
            if let Some(last) = slides.last_mut() {
                last.duration += duration;
                break;
            }
        }

        let i = slides.len();
        let caption = captions
            .get(i)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        slides.push(Slide {
            image_index: sequence[i % sequence.len()],
            duration,
            caption,
        });
        elapsed += duration;
    }

    Ok(slides)
}
