//! Short-time power spectrum and mel filterbank.
//!
//! ## Framing
//!
//! Frames are `win_length` samples long and start every `hop_length`
//! samples; no padding is added around the signal, so a clip of `len`
//! samples yields `(len - win_length) / hop_length + 1` frames.  Each frame
//! is multiplied by a periodic Hann window, centred in an `n_fft`-point
//! buffer (zero-filled on both sides when `win_length < n_fft`) and
//! transformed with `rustfft`.
//!
//! ## Mel scale
//!
//! HTK formula `mel = 2595 · log10(1 + hz / 700)`, triangular filters with
//! unit peak and no area normalisation.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::error::TransformError;

// ---------------------------------------------------------------------------
// Mel scale helpers
// ---------------------------------------------------------------------------

pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// Periodic Hann window of `len` samples.
pub fn hann_window(len: usize) -> Array1<f32> {
    Array1::from_shape_fn(len, |i| {
        (0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos()) as f32
    })
}

/// Triangular mel filterbank shaped `[n_mels, n_fft / 2 + 1]`.
///
/// Filter `j` rises from mel point `j` to `j + 1` and falls to `j + 2`,
/// where the `n_mels + 2` points are evenly spaced on the mel scale between
/// `f_min` and `f_max`.  Narrow low-frequency filters may fall between FFT
/// bins and come out all zero.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    f_min: f64,
    f_max: f64,
) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let nyquist = f64::from(sample_rate) / 2.0;
    let bin_hz = if n_freqs > 1 {
        nyquist / (n_freqs - 1) as f64
    } else {
        0.0
    };

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    Array2::from_shape_fn((n_mels, n_freqs), |(mel, bin)| {
        let freq = bin as f64 * bin_hz;
        let (left, center, right) = (points[mel], points[mel + 1], points[mel + 2]);
        let rising = (freq - left) / (center - left);
        let falling = (right - freq) / (right - center);
        rising.min(falling).max(0.0) as f32
    })
}

// ---------------------------------------------------------------------------
// PowerSpectrogram
// ---------------------------------------------------------------------------

/// Planned STFT producing `|X|²` frames.
pub struct PowerSpectrogram {
    fft: Arc<dyn Fft<f32>>,
    window: Array1<f32>,
    n_fft: usize,
    hop_length: usize,
}

impl PowerSpectrogram {
    /// # Errors
    ///
    /// [`TransformError::InvalidConfig`] unless
    /// `0 < win_length <= n_fft` and `hop_length > 0`.
    pub fn new(n_fft: usize, win_length: usize, hop_length: usize) -> Result<Self, TransformError> {
        if win_length == 0 || win_length > n_fft {
            return Err(TransformError::InvalidConfig(format!(
                "win_length {win_length} must be in 1..={n_fft}"
            )));
        }
        if hop_length == 0 {
            return Err(TransformError::InvalidConfig(
                "hop_length must be > 0".into(),
            ));
        }
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        Ok(Self {
            fft,
            window: hann_window(win_length),
            n_fft,
            hop_length,
        })
    }

    pub fn win_length(&self) -> usize {
        self.window.len()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of frequency bins per frame.
    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frames produced for `len` samples; `0` when `len < win_length`.
    pub fn num_frames(&self, len: usize) -> usize {
        match len.checked_sub(self.win_length()) {
            Some(extra) => extra / self.hop_length + 1,
            None => 0,
        }
    }

    /// Power spectrogram shaped `[n_freqs, frames]`.
    ///
    /// # Errors
    ///
    /// [`TransformError::EmptyAudio`] for an empty signal and
    /// [`TransformError::AudioTooShort`] when it cannot fill one window.
    pub fn compute(&self, samples: ArrayView1<'_, f32>) -> Result<Array2<f32>, TransformError> {
        if samples.is_empty() {
            return Err(TransformError::EmptyAudio);
        }
        let win_length = self.win_length();
        let n_frames = self.num_frames(samples.len());
        if n_frames == 0 {
            return Err(TransformError::AudioTooShort {
                samples: samples.len(),
                win_length,
            });
        }

        let offset = (self.n_fft - win_length) / 2;
        let mut power = Array2::<f32>::zeros((self.n_freqs(), n_frames));
        let mut buffer = vec![Complex::new(0.0_f32, 0.0); self.n_fft];

        for frame in 0..n_frames {
            let start = frame * self.hop_length;
            buffer.fill(Complex::new(0.0, 0.0));
            for (i, (&s, &w)) in samples
                .slice(ndarray::s![start..start + win_length])
                .iter()
                .zip(self.window.iter())
                .enumerate()
            {
                buffer[offset + i] = Complex::new(s * w, 0.0);
            }

            self.fft.process(&mut buffer);

            for (bin, value) in buffer.iter().take(self.n_freqs()).enumerate() {
                power[[bin, frame]] = value.norm_sqr();
            }
        }

        Ok(power)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0, 100.0, 1_000.0, 8_000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(700.0) - 2595.0 * 2.0_f64.log10()).abs() < 1e-9);
    }

    #[test]
    fn hann_window_is_periodic() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        // periodic: w[1] == w[7]
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn filterbank_shape_and_range() {
        let fb = mel_filterbank(16_000, 400, 80, 0.0, 8_000.0);
        assert_eq!(fb.dim(), (80, 201));
        assert!(fb.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn filter_peaks_move_up_in_frequency() {
        let fb = mel_filterbank(16_000, 1024, 40, 0.0, 8_000.0);
        let peaks: Vec<usize> = fb
            .outer_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                    .0
            })
            .collect();
        assert!(peaks.windows(2).all(|w| w[0] <= w[1]), "{peaks:?}");
        assert!(peaks[39] > peaks[0]);
    }

    #[test]
    fn frame_count_matches_formula() {
        let stft = PowerSpectrogram::new(400, 400, 200).unwrap();
        assert_eq!(stft.num_frames(399), 0);
        assert_eq!(stft.num_frames(400), 1);
        assert_eq!(stft.num_frames(599), 1);
        assert_eq!(stft.num_frames(600), 2);
        assert_eq!(stft.num_frames(16_000), 79);
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        // 1 kHz at 16 kHz with n_fft 400 → bin 25 (40 Hz per bin).
        let stft = PowerSpectrogram::new(400, 400, 200).unwrap();
        let tone = Array1::from_shape_fn(4_000, |i| {
            (2.0 * PI * 1_000.0 * i as f64 / 16_000.0).sin() as f32
        });
        let power = stft.compute(tone.view()).unwrap();
        let column = power.column(3);
        let peak = column
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        assert_eq!(peak, 25);
    }

    #[test]
    fn short_and_empty_signals_rejected() {
        let stft = PowerSpectrogram::new(400, 400, 200).unwrap();
        assert_eq!(
            stft.compute(Array1::zeros(0).view()),
            Err(TransformError::EmptyAudio)
        );
        assert_eq!(
            stft.compute(Array1::zeros(100).view()),
            Err(TransformError::AudioTooShort {
                samples: 100,
                win_length: 400
            })
        );
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(PowerSpectrogram::new(256, 400, 100).is_err());
        assert!(PowerSpectrogram::new(400, 0, 100).is_err());
        assert!(PowerSpectrogram::new(400, 400, 0).is_err());
    }
}
