//! Training-time random cropping of over-long clips.
//!
//! Clips at or under `max_window_size` samples pass through untouched.
//! Longer clips are cut to exactly `max_window_size` contiguous samples
//! starting at an offset drawn uniformly from `[0, len - max_window_size]`.
//!
//! The random source is injected so tests (and reproducible training runs)
//! can seed it.  Evaluation pipelines use
//! [`Identity`](super::Identity) in place of this stage.

use ndarray::s;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::WindowConfig;
use crate::data::LabeledAudioExample;

use super::compose::{Stage, Transform};
use super::error::TransformError;

/// One second at 16 kHz.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 16_000;

// ---------------------------------------------------------------------------
// random_slice
// ---------------------------------------------------------------------------

/// Crop every example longer than `max_window_size` to a random
/// `max_window_size`-sample window.
///
/// Output has the same length and order as `examples`.
///
/// # Errors
///
/// [`TransformError::InvalidWindowSize`] when `max_window_size == 0`.
///
/// # Example
///
/// ```rust
/// use ndarray::Array1;
/// use rand::{rngs::StdRng, SeedableRng};
/// use wakeword_features::data::LabeledAudioExample;
/// use wakeword_features::transform::random_slice;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let clips = vec![
///     LabeledAudioExample::new(Array1::zeros(12_000), false),
///     LabeledAudioExample::new(Array1::zeros(20_000), true),
/// ];
/// let out = random_slice(clips, 16_000, &mut rng).unwrap();
/// assert_eq!(out[0].num_samples(), 12_000);
/// assert_eq!(out[1].num_samples(), 16_000);
/// ```
pub fn random_slice<R: Rng + ?Sized>(
    examples: Vec<LabeledAudioExample>,
    max_window_size: usize,
    rng: &mut R,
) -> Result<Vec<LabeledAudioExample>, TransformError> {
    if max_window_size == 0 {
        return Err(TransformError::InvalidWindowSize(max_window_size));
    }

    let sliced = examples
        .into_iter()
        .map(|ex| {
            let len = ex.num_samples();
            if len <= max_window_size {
                return ex;
            }
            let start = rng.gen_range(0..=len - max_window_size);
            let window = ex
                .audio_data
                .slice(s![start..start + max_window_size])
                .to_owned();
            ex.with_audio(window)
        })
        .collect();

    Ok(sliced)
}

// ---------------------------------------------------------------------------
// RandomSlice
// ---------------------------------------------------------------------------

/// [`random_slice`] as a pipeline stage that owns its random source.
#[derive(Debug, Clone)]
pub struct RandomSlice<R = StdRng> {
    max_window_size: usize,
    rng: R,
}

impl RandomSlice<StdRng> {
    /// Stage seeded from OS entropy.
    pub fn new(max_window_size: usize) -> Self {
        Self::with_rng(max_window_size, StdRng::from_entropy())
    }

    /// Stage with a fixed seed, for reproducible crops.
    pub fn seeded(max_window_size: usize, seed: u64) -> Self {
        Self::with_rng(max_window_size, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.max_window_size)
    }
}

impl<R: Rng> RandomSlice<R> {
    pub fn with_rng(max_window_size: usize, rng: R) -> Self {
        Self {
            max_window_size,
            rng,
        }
    }

    pub fn max_window_size(&self) -> usize {
        self.max_window_size
    }
}

impl Default for RandomSlice<StdRng> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WINDOW_SIZE)
    }
}

impl<R> Stage for RandomSlice<R> {
    fn name(&self) -> &str {
        "random_slice"
    }
}

impl<R: Rng> Transform<Vec<LabeledAudioExample>> for RandomSlice<R> {
    type Output = Vec<LabeledAudioExample>;

    fn apply(
        &mut self,
        input: Vec<LabeledAudioExample>,
    ) -> Result<Vec<LabeledAudioExample>, TransformError> {
        random_slice(input, self.max_window_size, &mut self.rng)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
