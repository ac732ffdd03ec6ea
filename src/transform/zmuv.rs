//! Streaming zero-mean unit-variance (ZMUV) normalisation.
//!
//! [`ZmuvTransform`] keeps three running scalars over every element it has
//! seen:
//!
//! | Buffer | Meaning |
//! |--------|---------|
//! | `total` | number of contributing elements |
//! | `mean`  | running mean |
//! | `mean2` | running mean of squares |
//!
//! Each [`update`](ZmuvTransform::update) merges a chunk with a weighted
//! mean:
//!
//! ```text
//! mean  = (Σx  + mean  · total) / (total + n)
//! mean2 = (Σx² + mean2 · total) / (total + n)
//! total = total + n
//! ```
//!
//! and [`normalize`](ZmuvTransform::normalize) applies
//! `(x - mean) / sqrt(mean2 - mean²)`.
//!
//! Statistics only change through `&mut self` update calls; normalising is a
//! pure read.  Normalising before any update divides by zero and yields
//! NaN/Inf; call [`initialize`](ZmuvTransform::initialize) over a
//! representative sample first.
//!
//! # Example
//!
//! ```rust
//! use ndarray::array;
//! use wakeword_features::transform::ZmuvTransform;
//!
//! let mut zmuv = ZmuvTransform::new();
//! zmuv.update(&array![1.0_f32, 2.0, 3.0, 4.0, 5.0]).unwrap();
//!
//! assert!((zmuv.mean() - 3.0).abs() < 1e-9);
//! assert!((zmuv.std() - 2.0_f64.sqrt()).abs() < 1e-9);
//!
//! let out = zmuv.normalize(&array![3.0_f32]);
//! assert!(out[0].abs() < 1e-6);
//! ```

use ndarray::{Array, ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

use crate::data::FeatureBatch;

use super::compose::{Stage, StageKind, Transform};
use super::error::TransformError;

// ---------------------------------------------------------------------------
// ZmuvStats
// ---------------------------------------------------------------------------

/// Running moments, exposed for external checkpointing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZmuvStats {
    pub total: f64,
    pub mean: f64,
    pub mean2: f64,
}

impl ZmuvStats {
    /// `mean2 - mean²`.  May dip slightly below zero for near-constant data.
    pub fn variance(&self) -> f64 {
        self.mean2 - self.mean * self.mean
    }

    /// Square root of [`variance`](Self::variance), unclamped.
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    fn merge(&mut self, sum: f64, sum_sq: f64, n: f64) {
        let denom = self.total + n;
        self.mean = (sum + self.mean * self.total) / denom;
        self.mean2 = (sum_sq + self.mean2 * self.total) / denom;
        self.total += n;
    }
}

// ---------------------------------------------------------------------------
// ZmuvMode
// ---------------------------------------------------------------------------

/// What the stage does when run inside a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZmuvMode {
    /// Return normalised data; statistics are untouched.
    #[default]
    Normalize,
    /// Fold the data into the statistics and return it unchanged.
    Accumulate,
}

// ---------------------------------------------------------------------------
// ZmuvTransform
// ---------------------------------------------------------------------------

/// Streaming mean/variance normaliser.
///
/// Updates take `&mut self`; callers sharing one normaliser across threads
/// must serialise access themselves.
#[derive(Debug, Clone)]
pub struct ZmuvTransform {
    name: String,
    stats: ZmuvStats,
    mode: ZmuvMode,
}

impl Default for ZmuvTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ZmuvTransform {
    /// Zero-state normaliser named `"zmuv"` in [`Normalize`](ZmuvMode::Normalize)
    /// mode.
    pub fn new() -> Self {
        Self::with_name("zmuv")
    }

    /// Zero-state normaliser with a custom stage name.  Use distinct names
    /// when a pipeline holds several normalisers.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: ZmuvStats::default(),
            mode: ZmuvMode::default(),
        }
    }

    /// Normaliser resuming from previously exported statistics.
    pub fn from_stats(stats: ZmuvStats) -> Self {
        Self {
            stats,
            ..Self::new()
        }
    }

    pub fn stats(&self) -> ZmuvStats {
        self.stats
    }

    pub fn set_stats(&mut self, stats: ZmuvStats) {
        self.stats = stats;
    }

    pub fn total(&self) -> f64 {
        self.stats.total
    }

    pub fn mean(&self) -> f64 {
        self.stats.mean
    }

    pub fn mean2(&self) -> f64 {
        self.stats.mean2
    }

    pub fn std(&self) -> f64 {
        self.stats.std()
    }

    pub fn mode(&self) -> ZmuvMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ZmuvMode) {
        self.mode = mode;
    }

    /// Builder-style [`set_mode`](Self::set_mode).
    pub fn with_mode(mut self, mode: ZmuvMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fold every element of `data` into the running moments.
    pub fn update<S, D>(&mut self, data: &ArrayBase<S, D>) -> Result<(), TransformError>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let (sum, sum_sq) = data.iter().fold((0.0_f64, 0.0_f64), |(s, sq), &v| {
            let v = f64::from(v);
            (s + v, sq + v * v)
        });
        self.accumulate(sum, sum_sq, data.len() as f64);
        Ok(())
    }

    /// Fold `data * mask` into the running moments, counting `Σmask` (after
    /// broadcasting to the data shape) as the number of contributing
    /// elements.
    ///
    /// # Errors
    ///
    /// [`TransformError::MaskShape`] when `mask` does not broadcast to
    /// `data`.
    pub fn update_masked<S, D, T, E>(
        &mut self,
        data: &ArrayBase<S, D>,
        mask: &ArrayBase<T, E>,
    ) -> Result<(), TransformError>
    where
        S: Data<Elem = f32>,
        D: Dimension,
        T: Data<Elem = f32>,
        E: Dimension,
    {
        let mask = mask
            .broadcast(data.raw_dim())
            .ok_or_else(|| TransformError::MaskShape {
                data: data.shape().to_vec(),
                mask: mask.shape().to_vec(),
            })?;

        let (sum, sum_sq, n) = data.iter().zip(mask.iter()).fold(
            (0.0_f64, 0.0_f64, 0.0_f64),
            |(s, sq, n), (&v, &m)| {
                let v = f64::from(v * m);
                (s + v, sq + v * v, n + f64::from(m))
            },
        );
        self.accumulate(sum, sum_sq, n);
        Ok(())
    }

    /// Call [`update`](Self::update) once per item, in order.
    pub fn initialize<I, S, D>(&mut self, iterable: I) -> Result<(), TransformError>
    where
        I: IntoIterator<Item = ArrayBase<S, D>>,
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let mut chunks = 0usize;
        for item in iterable {
            self.update(&item)?;
            chunks += 1;
        }
        log::debug!(
            "zmuv '{}': initialised from {chunks} chunks (total={}, mean={:.6}, std={:.6})",
            self.name,
            self.stats.total,
            self.stats.mean,
            self.stats.std()
        );
        Ok(())
    }

    /// `(x - mean) / std`, elementwise.  Does not touch the statistics.
    pub fn normalize<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let mean = self.stats.mean;
        let std = self.stats.std();
        x.mapv(|v| ((f64::from(v) - mean) / std) as f32)
    }

    fn accumulate(&mut self, sum: f64, sum_sq: f64, n: f64) {
        // An empty chunk would turn a fresh state into 0/0.
        if n == 0.0 {
            log::trace!("zmuv '{}': skipping update with no elements", self.name);
            return;
        }
        self.stats.merge(sum, sum_sq, n);
    }
}

impl Stage for ZmuvTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Stateful
    }

    fn buffers(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total", self.stats.total),
            ("mean", self.stats.mean),
            ("mean2", self.stats.mean2),
        ]
    }

    fn load_buffer(&mut self, buffer: &str, value: f64) -> Result<(), TransformError> {
        match buffer {
            "total" => self.stats.total = value,
            "mean" => self.stats.mean = value,
            "mean2" => self.stats.mean2 = value,
            other => {
                return Err(TransformError::UnknownStateKey(format!(
                    "{}.{other}",
                    self.name
                )))
            }
        }
        Ok(())
    }
}

impl<D: Dimension> Transform<Array<f32, D>> for ZmuvTransform {
    type Output = Array<f32, D>;

    fn apply(&mut self, input: Array<f32, D>) -> Result<Array<f32, D>, TransformError> {
        match self.mode {
            ZmuvMode::Accumulate => {
                self.update(&input)?;
                Ok(input)
            }
            ZmuvMode::Normalize => Ok(self.normalize(&input)),
        }
    }
}

/// Padded frames (per [`FeatureBatch::lengths`]) are masked out when
/// accumulating.  Normalising touches every frame.
impl Transform<FeatureBatch> for ZmuvTransform {
    type Output = FeatureBatch;

    fn apply(&mut self, mut input: FeatureBatch) -> Result<FeatureBatch, TransformError> {
        match self.mode {
            ZmuvMode::Accumulate => {
                self.update_masked(&input.features, &input.mask())?;
            }
            ZmuvMode::Normalize => {
                input.features = self.normalize(&input.features);
            }
        }
        Ok(input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, concatenate, Array1, Array2, Array4, Axis};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    #[test]
    fn fresh_state_is_zero() {
        let zmuv = ZmuvTransform::new();
        assert_eq!(zmuv.stats(), ZmuvStats::default());
        assert_eq!(zmuv.mode(), ZmuvMode::Normalize);
    }

    #[test]
    fn two_chunks_match_one_concatenated_update() {
        let a: Array1<f32> = Array1::from_iter((0..37).map(|i| (i as f32 * 0.37).sin()));
        let b: Array1<f32> = Array1::from_iter((0..91).map(|i| (i as f32 * 0.11).cos() * 3.0));

        let mut split = ZmuvTransform::new();
        split.update(&a).unwrap();
        split.update(&b).unwrap();

        let mut whole = ZmuvTransform::new();
        whole
            .update(&concatenate(Axis(0), &[a.view(), b.view()]).unwrap())
            .unwrap();

        assert_eq!(split.total(), whole.total());
        assert_close(split.mean(), whole.mean(), 1e-9);
        assert_close(split.std(), whole.std(), 1e-9);
    }

    #[test]
    fn constant_data_has_zero_std() {
        let mut zmuv = ZmuvTransform::new();
        zmuv.update(&Array2::<f32>::from_elem((4, 8), 3.0)).unwrap();
        assert_eq!(zmuv.mean(), 3.0);
        assert_eq!(zmuv.std(), 0.0);
    }

    #[test]
    fn inexact_constant_leaves_unclamped_rounding_residue() {
        let mut zmuv = ZmuvTransform::new();
        zmuv.update(&Array1::<f32>::from_elem(1_000, 0.1)).unwrap();

        let variance = zmuv.stats().variance();
        assert!(variance.abs() < 1e-12, "variance {variance}");
        let std = zmuv.std();
        // Either the tiny rounding residue or NaN for a negative radicand.
        assert!(std.is_nan() || std < 1e-5, "std {std}");
        assert_eq!(std.to_bits(), variance.sqrt().to_bits());
    }

    #[test]
    fn negative_radicand_gives_nan_not_zero() {
        let zmuv = ZmuvTransform::from_stats(ZmuvStats {
            total: 4.0,
            mean: 1.0,
            mean2: 1.0 - 1e-12,
        });
        assert!(zmuv.stats().variance() < 0.0);
        assert!(zmuv.std().is_nan());
        assert!(zmuv.normalize(&array![1.0_f32, 2.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn normalize_maps_mean_to_zero_and_one_std_to_one() {
        let mut zmuv = ZmuvTransform::new();
        // mean 3, population variance 2
        zmuv.update(&array![1.0_f32, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let m = zmuv.mean() as f32;
        let sd = 2.0_f32.sqrt();
        let out = zmuv.normalize(&array![m, m + sd]);
        assert!(out[0].abs() < 1e-6, "{}", out[0]);
        assert!((out[1] - 1.0).abs() < 1e-5, "{}", out[1]);
    }

    #[test]
    fn normalize_does_not_change_statistics() {
        let mut zmuv = ZmuvTransform::new();
        zmuv.update(&array![1.0_f32, -1.0]).unwrap();
        let before = zmuv.stats();
        let _ = zmuv.normalize(&array![10.0_f32, 20.0]);
        assert_eq!(zmuv.stats(), before);
    }

    #[test]
    fn normalize_before_update_is_not_finite() {
        let zmuv = ZmuvTransform::new();
        let out = zmuv.normalize(&array![1.0_f32, 0.0]);
        assert!(out.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn mask_excludes_padding_from_statistics() {
        let data = array![[1.0_f32, 3.0, 99.0], [5.0, 99.0, 99.0]];
        let mask = array![[1.0_f32, 1.0, 0.0], [1.0, 0.0, 0.0]];

        let mut masked = ZmuvTransform::new();
        masked.update_masked(&data, &mask).unwrap();

        let mut plain = ZmuvTransform::new();
        plain.update(&array![1.0_f32, 3.0, 5.0]).unwrap();

        assert_eq!(masked.total(), 3.0);
        assert_close(masked.mean(), plain.mean(), 1e-12);
        assert_close(masked.mean2(), plain.mean2(), 1e-12);
    }

    #[test]
    fn mask_broadcasts_over_leading_axes() {
        let data = Array2::<f32>::from_elem((2, 4), 2.0);
        let mask = array![1.0_f32, 1.0, 0.0, 0.0];
        let mut zmuv = ZmuvTransform::new();
        zmuv.update_masked(&data, &mask).unwrap();
        assert_eq!(zmuv.total(), 4.0);
        assert_eq!(zmuv.mean(), 2.0);
    }

    #[test]
    fn mask_with_wrong_shape_is_rejected() {
        let mut zmuv = ZmuvTransform::new();
        let err = zmuv
            .update_masked(&Array2::<f32>::zeros((2, 3)), &array![1.0_f32, 1.0])
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::MaskShape {
                data: vec![2, 3],
                mask: vec![2],
            }
        );
        assert_eq!(zmuv.stats(), ZmuvStats::default());
    }

    #[test]
    fn empty_update_leaves_state_untouched() {
        let mut zmuv = ZmuvTransform::new();
        zmuv.update(&Array1::<f32>::zeros(0)).unwrap();
        assert_eq!(zmuv.stats(), ZmuvStats::default());
    }

    #[test]
    fn initialize_equals_sequential_updates() {
        let chunks = vec![array![1.0_f32, 2.0], array![4.0_f32], array![-3.0_f32, 0.5, 7.0]];

        let mut a = ZmuvTransform::new();
        a.initialize(chunks.clone()).unwrap();

        let mut b = ZmuvTransform::new();
        for c in &chunks {
            b.update(c).unwrap();
        }
        assert_eq!(a.stats(), b.stats());
        assert_eq!(a.total(), 6.0);
    }

    #[test]
    fn accumulate_mode_passes_data_through() {
        let mut zmuv = ZmuvTransform::new().with_mode(ZmuvMode::Accumulate);
        let x = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let out = zmuv.apply(x.clone()).unwrap();
        assert_eq!(out, x);
        assert_eq!(zmuv.total(), 4.0);
        assert_close(zmuv.mean(), 2.5, 1e-12);

        zmuv.set_mode(ZmuvMode::Normalize);
        let normed = zmuv.apply(x).unwrap();
        assert!((normed.sum()).abs() < 1e-5);
        assert_eq!(zmuv.total(), 4.0);
    }

    #[test]
    fn feature_batch_accumulation_ignores_padded_frames() {
        let mut features = Array4::<f32>::from_elem((2, 3, 2, 4), 1.0);
        // Padded frames of row 1 hold junk.
        features
            .slice_mut(ndarray::s![1, .., .., 2..])
            .fill(1_000.0);
        let batch = FeatureBatch {
            features,
            labels: array![1, 0],
            lengths: array![4, 2],
        };

        let mut zmuv = ZmuvTransform::new().with_mode(ZmuvMode::Accumulate);
        let out = zmuv.apply(batch.clone()).unwrap();
        assert_eq!(out, batch);
        // (4 + 2) frames * 3 channels * 2 mels
        assert_eq!(zmuv.total(), 36.0);
        assert_eq!(zmuv.mean(), 1.0);
    }

    #[test]
    fn buffers_round_trip_through_load_buffer() {
        let mut zmuv = ZmuvTransform::with_name("features");
        zmuv.update(&array![0.5_f32, 1.5]).unwrap();

        let mut restored = ZmuvTransform::with_name("features");
        for (buffer, value) in zmuv.buffers() {
            restored.load_buffer(buffer, value).unwrap();
        }
        assert_eq!(restored.stats(), zmuv.stats());
        assert!(restored.load_buffer("bogus", 1.0).is_err());
    }

    #[test]
    fn from_stats_resumes_accumulation() {
        let mut first = ZmuvTransform::new();
        first.update(&array![1.0_f32, 2.0]).unwrap();

        let mut resumed = ZmuvTransform::from_stats(first.stats());
        resumed.update(&array![3.0_f32]).unwrap();

        let mut whole = ZmuvTransform::new();
        whole.update(&array![1.0_f32, 2.0, 3.0]).unwrap();
        assert_close(resumed.mean(), whole.mean(), 1e-12);
        assert_close(resumed.mean2(), whole.mean2(), 1e-12);
    }
}
