//! Time derivative ("delta") of a `[features, time]` matrix.
//!
//! ```text
//!            Σ_{k=1..N} k · (c[t+k] - c[t-k])
//! d[t] =  ───────────────────────────────────
//!                 2 · Σ_{k=1..N} k²
//! ```
//!
//! with `N = (win_length - 1) / 2` and out-of-range frames replaced by the
//! nearest edge frame.

use ndarray::{Array2, ArrayView2};

/// Default regression window (`N = 2`).
pub const DEFAULT_DELTA_WIN_LENGTH: usize = 5;

/// Delta coefficients along axis 1 of `input`.
///
/// `win_length` must be odd and at least 3; callers validate it at
/// construction.
pub fn compute_deltas(input: ArrayView2<'_, f32>, win_length: usize) -> Array2<f32> {
    let n = (win_length.max(3) - 1) / 2;
    let denom = (n * (n + 1) * (2 * n + 1)) as f32 / 3.0;
    let (rows, frames) = input.dim();
    if frames == 0 {
        return Array2::zeros((rows, 0));
    }
    let last = frames - 1;

    Array2::from_shape_fn((rows, frames), |(row, t)| {
        let mut acc = 0.0_f32;
        for k in 1..=n {
            let ahead = (t + k).min(last);
            let behind = t.saturating_sub(k);
            acc += k as f32 * (input[[row, ahead]] - input[[row, behind]]);
        }
        acc / denom
    })
}
