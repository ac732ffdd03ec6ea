//! Data containers flowing through the transform pipeline.
//!
//! ```text
//! Vec<LabeledAudioExample> ──batchify──▶ ClassificationBatch
//!                          ──features──▶ FeatureBatch
//! ```

pub mod batch;
pub mod example;

pub use batch::{frame_mask, ClassificationBatch, FeatureBatch};
pub use example::{ClipMetadata, LabeledAudioExample};
