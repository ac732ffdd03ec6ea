//! Single labeled training clip.
//!
//! [`LabeledAudioExample`] is produced by the dataset loader and consumed
//! read-only by the windowing and batching stages.  Stages never mutate an
//! example in place; [`LabeledAudioExample::with_audio`] returns a new one
//! that shares everything except the waveform.

use std::path::PathBuf;
use std::sync::Arc;

use ndarray::Array1;

// ---------------------------------------------------------------------------
// ClipMetadata
// ---------------------------------------------------------------------------

/// Identity of a clip.  Carried through the pipeline but never inspected by
/// any transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipMetadata {
    /// Location of the source audio file, if the loader knows it.
    pub path: Option<PathBuf>,
    /// Transcription of the spoken content.
    pub transcription: String,
}

// ---------------------------------------------------------------------------
// LabeledAudioExample
// ---------------------------------------------------------------------------

/// One waveform plus its wake-word label.
///
/// # Example
///
/// ```rust
/// use ndarray::Array1;
/// use wakeword_features::data::LabeledAudioExample;
///
/// let ex = LabeledAudioExample::new(Array1::zeros(16_000), true);
/// let shorter = ex.with_audio(Array1::zeros(8_000));
///
/// assert_eq!(ex.num_samples(), 16_000);
/// assert_eq!(shorter.num_samples(), 8_000);
/// assert!(shorter.contains_wake_word);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledAudioExample {
    /// Mono waveform samples.
    pub audio_data: Array1<f32>,
    /// `true` when the clip contains the wake word.
    pub contains_wake_word: bool,
    /// Shared so that re-windowed copies do not duplicate it.
    pub metadata: Arc<ClipMetadata>,
}

impl LabeledAudioExample {
    /// Create an example with empty metadata.
    pub fn new(audio_data: Array1<f32>, contains_wake_word: bool) -> Self {
        Self::with_metadata(audio_data, contains_wake_word, ClipMetadata::default())
    }

    pub fn with_metadata(
        audio_data: Array1<f32>,
        contains_wake_word: bool,
        metadata: ClipMetadata,
    ) -> Self {
        Self {
            audio_data,
            contains_wake_word,
            metadata: Arc::new(metadata),
        }
    }

    /// Number of samples in the waveform (the last-dimension length).
    pub fn num_samples(&self) -> usize {
        self.audio_data.len()
    }

    /// Return a copy of this example with its waveform replaced.
    pub fn with_audio(&self, audio_data: Array1<f32>) -> Self {
        Self {
            audio_data,
            contains_wake_word: self.contains_wake_word,
            metadata: Arc::clone(&self.metadata),
        }
    }
}
