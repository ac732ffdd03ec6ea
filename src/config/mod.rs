//! Configuration module for the feature pipeline.
//!
//! Provides `FeatureConfig` (top-level settings) with its two sections and
//! TOML persistence via `FeatureConfig::load_from` / `FeatureConfig::save_to`.

pub mod settings;

pub use settings::{FeatureConfig, SpectrogramConfig, WindowConfig};
