//! Log-mel + delta + delta-delta feature extraction.
//!
//! ## Pipeline
//!
//! ```text
//! waveform ─▶ power STFT ─▶ 80-band mel ─▶ ln(x + 1e-7) ──────┐
//!                                             └─▶ Δ ─▶ ΔΔ     │
//!                                                  stack ◀─────┘
//!                                       [3, 80, frames]
//! ```
//!
//! Frame count for `n` input samples is
//! `(n - win_length) / hop_length + 1` (integer division), which is exactly
//! what [`MelFeatureExtractor::compute_lengths`] reports.
//!
//! The extractor holds no mutable state; extracting the same waveform twice
//! gives bit-identical output.

use std::fmt;

use ndarray::{Array1, Array2, Array3, Array4, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};

use crate::config::SpectrogramConfig;
use crate::data::{ClassificationBatch, FeatureBatch};

use super::compose::{Stage, Transform};
use super::delta::compute_deltas;
use super::error::TransformError;
use super::mel::{mel_filterbank, PowerSpectrogram};

/// Number of mel filters.  Fixed.
pub const N_MELS: usize = 80;

/// Added before the natural log to avoid `ln(0)`.
pub const LOG_EPSILON: f32 = 1e-7;

/// Feature channels stacked by [`MelFeatureExtractor::extract`].
pub const N_CHANNELS: usize = 3;

// ---------------------------------------------------------------------------
// MelFeatureExtractor
// ---------------------------------------------------------------------------

/// Deterministic waveform → `[3, 80, frames]` feature transform.
///
/// # Example
///
/// ```rust
/// use ndarray::Array1;
/// use wakeword_features::config::SpectrogramConfig;
/// use wakeword_features::transform::MelFeatureExtractor;
///
/// let extractor = MelFeatureExtractor::new(&SpectrogramConfig::default()).unwrap();
/// let audio = Array1::<f32>::zeros(16_000);
///
/// let features = extractor.extract(&audio).unwrap();
/// assert_eq!(features.dim(), (3, 80, extractor.num_frames(16_000)));
/// ```
pub struct MelFeatureExtractor {
    config: SpectrogramConfig,
    stft: PowerSpectrogram,
    filterbank: Array2<f32>,
}

impl fmt::Debug for MelFeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MelFeatureExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MelFeatureExtractor {
    /// Build an extractor, planning the FFT and filterbank once.
    ///
    /// # Errors
    ///
    /// [`TransformError::InvalidConfig`] for inconsistent window, hop,
    /// frequency-range or delta settings.
    pub fn new(config: &SpectrogramConfig) -> Result<Self, TransformError> {
        let win_length = config.effective_win_length();
        let hop_length = config.effective_hop_length();
        let f_max = config.effective_f_max();

        if config.sample_rate == 0 {
            return Err(TransformError::InvalidConfig(
                "sample_rate must be > 0".into(),
            ));
        }
        if f_max > f64::from(config.sample_rate) / 2.0 {
            return Err(TransformError::InvalidConfig(format!(
                "f_max {f_max} exceeds Nyquist ({} Hz)",
                f64::from(config.sample_rate) / 2.0
            )));
        }
        if !(0.0..f_max).contains(&config.f_min) {
            return Err(TransformError::InvalidConfig(format!(
                "f_min {} must be in [0, {f_max})",
                config.f_min
            )));
        }
        if config.delta_win_length < 3 || config.delta_win_length % 2 == 0 {
            return Err(TransformError::InvalidConfig(format!(
                "delta_win_length {} must be odd and >= 3",
                config.delta_win_length
            )));
        }

        let stft = PowerSpectrogram::new(config.n_fft, win_length, hop_length)?;
        let filterbank = mel_filterbank(
            config.sample_rate,
            config.n_fft,
            N_MELS,
            config.f_min,
            f_max,
        );

        let empty_filters = filterbank
            .outer_iter()
            .filter(|row| row.iter().all(|&v| v == 0.0))
            .count();
        if empty_filters > 0 {
            log::debug!(
                "mel filterbank: {empty_filters} of {N_MELS} filters cover no FFT bin (n_fft={})",
                config.n_fft
            );
        }
        log::debug!(
            "mel extractor: sr={} n_fft={} win={win_length} hop={hop_length} f=[{}, {f_max}]",
            config.sample_rate,
            config.n_fft,
            config.f_min
        );

        Ok(Self {
            config: config.clone(),
            stft,
            filterbank,
        })
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    pub fn n_mels(&self) -> usize {
        N_MELS
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn win_length(&self) -> usize {
        self.stft.win_length()
    }

    pub fn hop_length(&self) -> usize {
        self.stft.hop_length()
    }

    /// Frames produced for a waveform of `samples` samples.
    ///
    /// `0` when the waveform is shorter than one analysis window.
    pub fn num_frames(&self, samples: usize) -> usize {
        self.stft.num_frames(samples)
    }

    /// [`num_frames`](Self::num_frames) for each entry of `lengths`.
    pub fn compute_lengths(&self, lengths: &Array1<usize>) -> Array1<usize> {
        lengths.mapv(|n| self.num_frames(n))
    }

    /// Natural-log mel energies shaped `[80, frames]`.
    pub fn log_mel(&self, audio: ArrayView1<'_, f32>) -> Result<Array2<f32>, TransformError> {
        let power = self.stft.compute(audio)?;
        let mut mel = self.filterbank.dot(&power);
        mel.mapv_inplace(|v| (v + LOG_EPSILON).ln());
        Ok(mel)
    }

    /// Stacked `[log-mel, Δ, ΔΔ]` features shaped `[3, 80, frames]`.
    ///
    /// # Errors
    ///
    /// [`TransformError::EmptyAudio`] / [`TransformError::AudioTooShort`]
    /// when the waveform cannot fill a single analysis window.
    pub fn extract<S>(&self, audio: &ArrayBase<S, Ix1>) -> Result<Array3<f32>, TransformError>
    where
        S: Data<Elem = f32>,
    {
        let log_mel = self.log_mel(audio.view())?;
        let deltas = compute_deltas(log_mel.view(), self.config.delta_win_length);
        let accels = compute_deltas(deltas.view(), self.config.delta_win_length);

        let mut out = Array3::<f32>::zeros((N_CHANNELS, N_MELS, log_mel.ncols()));
        out.index_axis_mut(Axis(0), 0).assign(&log_mel);
        out.index_axis_mut(Axis(0), 1).assign(&deltas);
        out.index_axis_mut(Axis(0), 2).assign(&accels);
        Ok(out)
    }

    /// [`extract`](Self::extract) for every row of `audio`, shaped
    /// `[batch, 3, 80, frames]`.
    pub fn extract_batch<S>(
        &self,
        audio: &ArrayBase<S, Ix2>,
    ) -> Result<Array4<f32>, TransformError>
    where
        S: Data<Elem = f32>,
    {
        if audio.nrows() == 0 {
            return Err(TransformError::EmptyBatch);
        }
        let frames = self.num_frames(audio.ncols());
        let mut out = Array4::<f32>::zeros((audio.nrows(), N_CHANNELS, N_MELS, frames));
        for (row, mut slot) in audio.outer_iter().zip(out.outer_iter_mut()) {
            slot.assign(&self.extract(&row)?);
        }
        Ok(out)
    }

    /// Features for a padded batch, with per-row frame counts derived from
    /// the unpadded sample lengths.
    pub fn extract_classification_batch(
        &self,
        batch: &ClassificationBatch,
    ) -> Result<FeatureBatch, TransformError> {
        Ok(FeatureBatch {
            features: self.extract_batch(&batch.audio)?,
            labels: batch.labels.clone(),
            lengths: self.compute_lengths(&batch.lengths),
        })
    }
}

impl Stage for MelFeatureExtractor {
    fn name(&self) -> &str {
        "mel_features"
    }
}

impl Transform<ClassificationBatch> for MelFeatureExtractor {
    type Output = FeatureBatch;

    fn apply(&mut self, input: ClassificationBatch) -> Result<FeatureBatch, TransformError> {
        self.extract_classification_batch(&input)
    }
}

impl Transform<Array2<f32>> for MelFeatureExtractor {
    type Output = Array4<f32>;

    fn apply(&mut self, input: Array2<f32>) -> Result<Array4<f32>, TransformError> {
        self.extract_batch(&input)
    }
}

impl Transform<Array1<f32>> for MelFeatureExtractor {
    type Output = Array3<f32>;

    fn apply(&mut self, input: Array1<f32>) -> Result<Array3<f32>, TransformError> {
        self.extract(&input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s};

    fn extractor() -> MelFeatureExtractor {
        MelFeatureExtractor::new(&SpectrogramConfig::default()).expect("default config")
    }

    fn chirp(len: usize) -> Array1<f32> {
        Array1::from_shape_fn(len, |i| {
            let t = i as f32 / 16_000.0;
            (2.0 * std::f32::consts::PI * (200.0 + 1_500.0 * t) * t).sin() * 0.3
        })
    }

    #[test]
    fn compute_lengths_matches_produced_frames() {
        let ex = extractor();
        let (win, hop) = (ex.win_length(), ex.hop_length());
        for n in [win, win + hop, win + 5 * hop, win + 5 * hop + hop / 2, 16_000] {
            let produced = ex.extract(&chirp(n)).unwrap().len_of(Axis(2));
            let computed = ex.compute_lengths(&array![n])[0];
            assert_eq!(produced, computed, "n = {n}");
        }
    }

    #[test]
    fn compute_lengths_formula() {
        let ex = extractor();
        // (n - 400) / 200 + 1
        assert_eq!(
            ex.compute_lengths(&array![400, 600, 1_400, 16_000]).to_vec(),
            vec![1, 2, 6, 79]
        );
    }

    #[test]
    fn custom_hop_changes_frame_count() {
        let config = SpectrogramConfig {
            n_fft: 512,
            win_length: Some(400),
            hop_length: Some(160),
            ..SpectrogramConfig::default()
        };
        let ex = MelFeatureExtractor::new(&config).unwrap();
        let features = ex.extract(&chirp(16_000)).unwrap();
        assert_eq!(features.dim(), (3, 80, (16_000 - 400) / 160 + 1));
    }

    #[test]
    fn silence_gives_epsilon_floor_and_zero_deltas() {
        let ex = extractor();
        let features = ex.extract(&Array1::<f32>::zeros(4_000)).unwrap();
        let floor = LOG_EPSILON.ln();
        assert!(features
            .index_axis(Axis(0), 0)
            .iter()
            .all(|&v| (v - floor).abs() < 1e-4));
        assert!(features.slice(s![1.., .., ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = extractor();
        let audio = chirp(9_000);
        assert_eq!(ex.extract(&audio).unwrap(), ex.extract(&audio).unwrap());
    }

    #[test]
    fn channels_are_log_mel_and_its_derivatives() {
        let ex = extractor();
        let audio = chirp(8_000);
        let features = ex.extract(&audio).unwrap();

        let log_mel = ex.log_mel(audio.view()).unwrap();
        let deltas = compute_deltas(log_mel.view(), 5);
        let accels = compute_deltas(deltas.view(), 5);
        assert_eq!(features.index_axis(Axis(0), 0), log_mel);
        assert_eq!(features.index_axis(Axis(0), 1), deltas);
        assert_eq!(features.index_axis(Axis(0), 2), accels);
    }

    #[test]
    fn short_audio_rejected() {
        let ex = extractor();
        assert_eq!(
            ex.extract(&Array1::<f32>::zeros(0)),
            Err(TransformError::EmptyAudio)
        );
        assert!(matches!(
            ex.extract(&Array1::<f32>::zeros(399)),
            Err(TransformError::AudioTooShort { samples: 399, .. })
        ));
    }

    #[test]
    fn batch_rows_match_single_extraction() {
        let ex = extractor();
        let mut audio = Array2::<f32>::zeros((2, 2_000));
        audio.row_mut(0).assign(&chirp(2_000));
        audio.slice_mut(s![1, ..1_000]).assign(&chirp(1_000));

        let batch = ex.extract_batch(&audio).unwrap();
        assert_eq!(batch.dim(), (2, 3, 80, 9));
        assert_eq!(
            batch.index_axis(Axis(0), 0),
            ex.extract(&audio.row(0)).unwrap()
        );
        assert_eq!(
            batch.index_axis(Axis(0), 1),
            ex.extract(&audio.row(1)).unwrap()
        );
    }

    #[test]
    fn classification_batch_to_feature_batch() {
        let mut ex = extractor();
        let batch = ClassificationBatch {
            audio: Array2::zeros((2, 1_400)),
            labels: array![1, 0],
            lengths: array![1_400, 600],
        };
        let features = ex.apply(batch).unwrap();
        assert_eq!(features.features.dim(), (2, 3, 80, 6));
        assert_eq!(features.lengths.to_vec(), vec![6, 2]);
        assert_eq!(features.labels.to_vec(), vec![1, 0]);
    }

    #[test]
    fn invalid_configs_rejected() {
        let bad_delta = SpectrogramConfig {
            delta_win_length: 4,
            ..SpectrogramConfig::default()
        };
        assert!(matches!(
            MelFeatureExtractor::new(&bad_delta),
            Err(TransformError::InvalidConfig(_))
        ));

        let bad_window = SpectrogramConfig {
            win_length: Some(1_024),
            ..SpectrogramConfig::default()
        };
        assert!(MelFeatureExtractor::new(&bad_window).is_err());

        let bad_range = SpectrogramConfig {
            f_min: 9_000.0,
            ..SpectrogramConfig::default()
        };
        assert!(MelFeatureExtractor::new(&bad_range).is_err());
    }
}
