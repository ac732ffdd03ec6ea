//! Error type shared by every transform stage.

use thiserror::Error;

/// Failures raised by pipeline stages.
///
/// Numerical degeneracy (normalising before any statistics were collected)
/// yields NaN/Inf values rather than an error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// Batching was asked to stack zero examples.
    #[error("cannot build a batch from zero examples")]
    EmptyBatch,

    /// A waveform with no samples reached the feature extractor.
    #[error("audio contains no samples")]
    EmptyAudio,

    /// The waveform cannot fill a single analysis window.
    #[error("audio too short: {samples} samples, need at least {win_length}")]
    AudioTooShort { samples: usize, win_length: usize },

    /// Maximum window size must be at least one sample.
    #[error("invalid window size: {0}")]
    InvalidWindowSize(usize),

    /// A normaliser mask could not be broadcast to the data shape.
    #[error("mask shape {mask:?} does not broadcast to data shape {data:?}")]
    MaskShape { data: Vec<usize>, mask: Vec<usize> },

    /// Spectrogram parameters are inconsistent.
    #[error("invalid spectrogram config: {0}")]
    InvalidConfig(String),

    /// Two stateful stages in one pipeline share a name, so their state
    /// keys would collide.
    #[error("duplicate stateful stage name: {0}")]
    DuplicateStage(String),

    /// A state entry does not belong to any stateful stage.
    #[error("unknown state key: {0}")]
    UnknownStateKey(String),
}
