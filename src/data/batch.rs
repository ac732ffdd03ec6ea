//! Batch containers handed to model code.
//!
//! | Type | audio / features | labels | lengths |
//! |------|------------------|--------|---------|
//! | [`ClassificationBatch`] | `[batch, max_samples]` | `[batch]` 0/1 | samples |
//! | [`FeatureBatch`] | `[batch, 3, mel, max_frames]` | `[batch]` 0/1 | frames |
//!
//! In both, row `i` of every array describes the same clip.

use ndarray::{Array1, Array2, Array4, Axis};

// ---------------------------------------------------------------------------
// ClassificationBatch
// ---------------------------------------------------------------------------

/// Zero-padded waveforms with their labels and unpadded lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationBatch {
    /// `[batch, max_length]`, right-padded with zeros.
    pub audio: Array2<f32>,
    /// `[batch]`, `1` when the clip contains the wake word.
    pub labels: Array1<i64>,
    /// `[batch]`, original sample count of each row (`<= audio.ncols()`).
    pub lengths: Array1<usize>,
}

impl ClassificationBatch {
    /// Number of clips in the batch.
    pub fn len(&self) -> usize {
        self.audio.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.nrows() == 0
    }

    /// Padded width shared by every row.
    pub fn max_length(&self) -> usize {
        self.audio.ncols()
    }
}

// ---------------------------------------------------------------------------
// FeatureBatch
// ---------------------------------------------------------------------------

/// Spectral features for a [`ClassificationBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    /// `[batch, 3, n_mels, max_frames]` (log-mel, delta, delta-delta).
    pub features: Array4<f32>,
    /// `[batch]`, copied from the source batch.
    pub labels: Array1<i64>,
    /// `[batch]`, number of frames computed from real (unpadded) samples.
    pub lengths: Array1<usize>,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames per row after padding.
    pub fn max_frames(&self) -> usize {
        self.features.len_of(Axis(3))
    }

    /// Validity mask shaped `[batch, 1, 1, max_frames]`, broadcastable over
    /// the feature array.
    pub fn mask(&self) -> Array4<f32> {
        let mask = frame_mask(&self.lengths, self.max_frames());
        let (batch, frames) = mask.dim();
        Array4::from_shape_fn((batch, 1, 1, frames), |(row, _, _, col)| mask[[row, col]])
    }
}

// ---------------------------------------------------------------------------
// frame_mask
// ---------------------------------------------------------------------------

/// Build a `[batch, max_len]` mask with `1.0` for positions below each row's
/// length and `0.0` elsewhere.  Lengths larger than `max_len` saturate.
///
/// ```rust
/// use ndarray::array;
/// use wakeword_features::data::frame_mask;
///
/// let mask = frame_mask(&array![3, 1], 4);
/// assert_eq!(mask, array![[1.0_f32, 1.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0]]);
/// ```
pub fn frame_mask(lengths: &Array1<usize>, max_len: usize) -> Array2<f32> {
    Array2::from_shape_fn((lengths.len(), max_len), |(row, col)| {
        if col < lengths[row] {
            1.0
        } else {
            0.0
        }
    })
}
