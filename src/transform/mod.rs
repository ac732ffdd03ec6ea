//! Feature transform stages and their composition.
//!
//! ## Stage flow
//!
//! ```text
//!  Vec<LabeledAudioExample>
//!        │
//!        ▼
//!  ┌──────────────┐  training only; Identity at evaluation
//!  │ RandomSlice  │
//!  └──────┬───────┘
//!         ▼
//!  ┌──────────────┐
//!  │  Batchify    │──▶ ClassificationBatch  [batch, samples]
//!  └──────┬───────┘
//!         ▼
//!  ┌──────────────────────┐
//!  │ MelFeatureExtractor  │──▶ FeatureBatch  [batch, 3, 80, frames]
//!  └──────┬───────────────┘
//!         ▼
//!  ┌──────────────┐
//!  │ ZmuvTransform│  accumulate (masked) or normalise
//!  └──────────────┘
//! ```
//!
//! [`training_pipeline`] and [`evaluation_pipeline`] build the first two
//! stages; feature extraction and normalisation are appended by the caller
//! with [`Pipeline::then`] so they can be shared between both.

pub mod batchify;
pub mod compose;
pub mod delta;
pub mod error;
pub mod mel;
pub mod spectral;
pub mod window;
pub mod zmuv;

pub use batchify::{batchify, Batchify};
pub use compose::{
    stage_fn, Chain, FnStage, Identity, Pipeline, Stage, StageDescriptor, StageKind, StateDict,
    Transform,
};
pub use error::TransformError;
pub use spectral::MelFeatureExtractor;
pub use window::{random_slice, RandomSlice, DEFAULT_MAX_WINDOW_SIZE};
pub use zmuv::{ZmuvMode, ZmuvStats, ZmuvTransform};

use rand::Rng;

use crate::config::WindowConfig;

/// Random crop followed by batching.
pub fn training_pipeline<R: Rng>(
    config: &WindowConfig,
    rng: R,
) -> Pipeline<Chain<RandomSlice<R>, Batchify>> {
    Pipeline::new(RandomSlice::with_rng(config.max_window_size, rng)).then(Batchify)
}

/// Batching only; clips keep their full length.
pub fn evaluation_pipeline() -> Pipeline<Chain<Identity, Batchify>> {
    Pipeline::new(Identity).then(Batchify)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
