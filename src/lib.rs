//! Feature transform pipeline for wake-word model training.
//!
//! Turns labelled audio clips into padded, normalised spectral feature
//! batches.
//!
//! ```text
//!  clips ─▶ random_slice ─▶ batchify ─▶ log-mel + Δ + ΔΔ ─▶ ZMUV ─▶ model
//!           (train only)    [B, T]      [B, 3, 80, frames]
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`data`] | clip and batch containers |
//! | [`transform`] | stages, composition, spectral features, ZMUV |
//! | [`config`] | TOML-backed settings for the stages |
//!
//! # Example
//!
//! ```rust
//! use ndarray::Array1;
//! use wakeword_features::config::FeatureConfig;
//! use wakeword_features::data::LabeledAudioExample;
//! use wakeword_features::transform::{
//!     evaluation_pipeline, MelFeatureExtractor, ZmuvMode, ZmuvTransform,
//! };
//!
//! let config = FeatureConfig::default();
//! let extractor = MelFeatureExtractor::new(&config.spectrogram).unwrap();
//! let zmuv = ZmuvTransform::new().with_mode(ZmuvMode::Accumulate);
//!
//! let mut pipeline = evaluation_pipeline().then(extractor).then(zmuv);
//! let batch = pipeline
//!     .run(vec![
//!         LabeledAudioExample::new(Array1::from_elem(8_000, 0.1), true),
//!         LabeledAudioExample::new(Array1::from_elem(4_000, -0.1), false),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(batch.features.dim(), (2, 3, 80, 39));
//! assert_eq!(batch.lengths.to_vec(), vec![39, 19]);
//! ```

pub mod config;
pub mod data;
pub mod transform;

pub use config::FeatureConfig;
pub use data::{ClassificationBatch, FeatureBatch, LabeledAudioExample};
pub use transform::{Pipeline, TransformError};
