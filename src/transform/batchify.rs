//! Stack variable-length clips into one zero-padded batch.
//!
//! ## Algorithm
//!
//! 1. Stable sort by sample count, longest first (equal lengths keep their
//!    input order).
//! 2. Right-pad every waveform with zeros to the longest length.
//! 3. Record the original lengths and 0/1 labels in the same order.

use std::cmp::Reverse;

use ndarray::{s, Array1, Array2};

use crate::data::{ClassificationBatch, LabeledAudioExample};

use super::compose::{Stage, Transform};
use super::error::TransformError;

/// Build a [`ClassificationBatch`] from `examples`.
///
/// # Errors
///
/// [`TransformError::EmptyBatch`] when `examples` is empty.
///
/// # Example
///
/// ```rust
/// use ndarray::Array1;
/// use wakeword_features::data::LabeledAudioExample;
/// use wakeword_features::transform::batchify;
///
/// let batch = batchify(vec![
///     LabeledAudioExample::new(Array1::ones(3), false),
///     LabeledAudioExample::new(Array1::ones(5), true),
/// ])
/// .unwrap();
///
/// assert_eq!(batch.audio.dim(), (2, 5));
/// assert_eq!(batch.lengths.to_vec(), vec![5, 3]);
/// assert_eq!(batch.labels.to_vec(), vec![1, 0]);
/// ```
pub fn batchify(
    mut examples: Vec<LabeledAudioExample>,
) -> Result<ClassificationBatch, TransformError> {
    // `sort_by_key` is stable.
    examples.sort_by_key(|ex| Reverse(ex.num_samples()));

    let max_length = examples
        .iter()
        .map(LabeledAudioExample::num_samples)
        .max()
        .ok_or(TransformError::EmptyBatch)?;

    let mut audio = Array2::<f32>::zeros((examples.len(), max_length));
    for (mut row, ex) in audio.outer_iter_mut().zip(&examples) {
        row.slice_mut(s![..ex.num_samples()]).assign(&ex.audio_data);
    }

    let lengths: Array1<usize> = examples.iter().map(|ex| ex.num_samples()).collect();
    let labels: Array1<i64> = examples
        .iter()
        .map(|ex| i64::from(ex.contains_wake_word))
        .collect();

    log::trace!(
        "batchify: {} clips padded to {max_length} samples",
        examples.len()
    );

    Ok(ClassificationBatch {
        audio,
        labels,
        lengths,
    })
}

/// [`batchify`] as a pipeline stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Batchify;

impl Stage for Batchify {
    fn name(&self) -> &str {
        "batchify"
    }
}

impl Transform<Vec<LabeledAudioExample>> for Batchify {
    type Output = ClassificationBatch;

    fn apply(
        &mut self,
        input: Vec<LabeledAudioExample>,
    ) -> Result<ClassificationBatch, TransformError> {
        batchify(input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(len: usize, value: f32, label: bool) -> LabeledAudioExample {
        LabeledAudioExample::new(Array1::from_elem(len, value), label)
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(batchify(Vec::new()), Err(TransformError::EmptyBatch));
    }

    #[test]
    fn shape_matches_count_and_longest_clip() {
        let batch = batchify(vec![
            clip(7, 0.1, false),
            clip(12, 0.2, true),
            clip(3, 0.3, false),
        ])
        .unwrap();
        assert_eq!(batch.audio.dim(), (3, 12));
        assert_eq!(batch.labels.len(), 3);
        assert_eq!(batch.lengths.len(), 3);
    }

    #[test]
    fn padding_is_zero_past_each_length() {
        let batch = batchify(vec![clip(4, 1.0, true), clip(9, 2.0, false), clip(1, 3.0, true)])
            .unwrap();
        for (row, &len) in batch.audio.outer_iter().zip(batch.lengths.iter()) {
            assert!(len <= batch.max_length());
            assert!(row.iter().take(len).all(|&v| v != 0.0));
            assert!(row.iter().skip(len).all(|&v| v == 0.0));
        }
    }

    #[test]
    fn sorted_descending_and_stable_for_ties() {
        // Values tag the input position.
        let batch = batchify(vec![
            clip(5, 1.0, false),
            clip(8, 2.0, true),
            clip(5, 3.0, true),
            clip(8, 4.0, false),
        ])
        .unwrap();

        assert_eq!(batch.lengths.to_vec(), vec![8, 8, 5, 5]);
        let tags: Vec<f32> = batch.audio.outer_iter().map(|row| row[0]).collect();
        assert_eq!(tags, vec![2.0, 4.0, 1.0, 3.0]);
        assert_eq!(batch.labels.to_vec(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn single_example_batch() {
        let batch = batchify(vec![clip(6, 0.5, true)]).unwrap();
        assert_eq!(batch.audio.dim(), (1, 6));
        assert_eq!(batch.lengths.to_vec(), vec![6]);
        assert_eq!(batch.labels.to_vec(), vec![1]);
    }

    #[test]
    fn identical_input_gives_identical_batch() {
        let clips = vec![clip(3, 1.0, true), clip(3, 2.0, false), clip(2, 3.0, true)];
        assert_eq!(batchify(clips.clone()), batchify(clips));
    }
}
