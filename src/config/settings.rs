//! Feature pipeline settings, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files alongside a training
//! run's other configuration.
//!
//! ```toml
//! [window]
//! max_window_size = 16000
//!
//! [spectrogram]
//! sample_rate = 16000
//! n_fft = 400
//! f_min = 0.0
//! delta_win_length = 5
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::transform::delta::DEFAULT_DELTA_WIN_LENGTH;
use crate::transform::spectral::MelFeatureExtractor;
use crate::transform::window::DEFAULT_MAX_WINDOW_SIZE;

// ---------------------------------------------------------------------------
// WindowConfig
// ---------------------------------------------------------------------------

/// Settings for training-time random cropping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Clips longer than this many samples are randomly cropped to it.
    pub max_window_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrogramConfig
// ---------------------------------------------------------------------------

/// Settings for the log-mel + delta feature extractor.
///
/// The mel filter count is fixed at 80 and is not configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// FFT size; `n_fft / 2 + 1` frequency bins per frame.
    pub n_fft: usize,
    /// Analysis window length in samples.  `None` → `n_fft`.
    pub win_length: Option<usize>,
    /// Stride between frames in samples.  `None` → `win_length / 2`.
    pub hop_length: Option<usize>,
    /// Lowest mel filter edge in Hz.
    pub f_min: f64,
    /// Highest mel filter edge in Hz.  `None` → `sample_rate / 2`.
    pub f_max: Option<f64>,
    /// Regression window for delta features (odd, ≥ 3).
    pub delta_win_length: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_fft: 400,
            win_length: None,
            hop_length: None,
            f_min: 0.0,
            f_max: None,
            delta_win_length: DEFAULT_DELTA_WIN_LENGTH,
        }
    }
}

impl SpectrogramConfig {
    /// Window length after applying the `n_fft` fallback.
    pub fn effective_win_length(&self) -> usize {
        self.win_length.unwrap_or(self.n_fft)
    }

    /// Hop length after applying the `win_length / 2` fallback.
    pub fn effective_hop_length(&self) -> usize {
        self.hop_length
            .unwrap_or_else(|| self.effective_win_length() / 2)
    }

    /// Upper filter edge after applying the Nyquist fallback.
    pub fn effective_f_max(&self) -> f64 {
        self.f_max
            .unwrap_or_else(|| f64::from(self.sample_rate) / 2.0)
    }
}

// ---------------------------------------------------------------------------
// FeatureConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level feature pipeline configuration, serialised as `features.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use wakeword_features::config::FeatureConfig;
///
/// // Load (returns Default when file is missing)
/// let config = FeatureConfig::load_from("features.toml".as_ref()).unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Random cropping settings.
    pub window: WindowConfig,
    /// Spectral feature settings.
    pub spectrogram: SpectrogramConfig,
}

impl FeatureConfig {
    /// Load from `path`.
    ///
    /// Returns `Ok(FeatureConfig::default())` when the file does not exist,
    /// so callers never need to special-case a missing file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("{} not found; using default feature config", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check parameter consistency before building any stage.
    ///
    /// Spectrogram settings are checked by constructing the
    /// [`MelFeatureExtractor`] they describe.
    pub fn validate(&self) -> Result<()> {
        if self.window.max_window_size == 0 {
            bail!("window.max_window_size must be > 0");
        }
        let extractor =
            MelFeatureExtractor::new(&self.spectrogram).context("invalid [spectrogram] section")?;
        if self.window.max_window_size < extractor.win_length() {
            log::debug!(
                "max_window_size {} is shorter than one analysis window ({})",
                self.window.max_window_size,
                extractor.win_length()
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
