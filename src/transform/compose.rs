//! Sequential stage composition.
//!
//! A [`Pipeline`] threads one input value through an ordered chain of
//! stages; each stage's output is the next stage's only input.  The chain is
//! statically typed, so a stage whose input does not match the previous
//! stage's output is a compile error rather than a runtime failure.
//!
//! ```text
//! Pipeline::new(a).then(b).then(c)
//!   == Chain(Chain(a, b), c)
//!
//! run(x) = c(b(a(x)?)?)?
//! ```
//!
//! Every stage carries a [`StageDescriptor`] (name + [`StageKind`]).
//! Stages that own persistent numeric state report
//! [`StageKind::Stateful`] and expose their buffers, which lets
//! [`Pipeline::state_dict`] and [`Pipeline::load_state_dict`] export and
//! restore the whole chain's state in one call.
//!
//! # Example
//!
//! ```rust
//! use wakeword_features::transform::{stage_fn, Identity, Pipeline, TransformError};
//!
//! let mut pipeline = Pipeline::new(Identity)
//!     .then(stage_fn("double", |x: i32| Ok::<_, TransformError>(x * 2)))
//!     .then(stage_fn("describe", |x: i32| Ok::<_, TransformError>(format!("{x}"))));
//!
//! assert_eq!(pipeline.run(21).unwrap(), "42");
//! assert_eq!(pipeline.stages().len(), 3);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use super::error::TransformError;

/// Exported stage state: `"<stage name>.<buffer>" → value`.
pub type StateDict = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// StageKind / StageDescriptor
// ---------------------------------------------------------------------------

/// Whether a stage owns persistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Pure function of its input (it may still consume randomness).
    Stateless,
    /// Owns buffers that survive between calls and belong in checkpoints.
    Stateful,
}

/// Static description of one stage in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
}

// ---------------------------------------------------------------------------
// Stage / Transform traits
// ---------------------------------------------------------------------------

/// Input-independent half of a stage: identity and persistent state.
pub trait Stage {
    /// Name used in descriptors and state keys.
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind {
        StageKind::Stateless
    }

    /// Persistent buffers as `(buffer, value)` pairs.  Empty for stateless
    /// stages.
    fn buffers(&self) -> Vec<(&'static str, f64)> {
        Vec::new()
    }

    /// Overwrite one buffer reported by [`buffers`](Self::buffers).
    fn load_buffer(&mut self, buffer: &str, _value: f64) -> Result<(), TransformError> {
        Err(TransformError::UnknownStateKey(format!(
            "{}.{buffer}",
            self.name()
        )))
    }

    /// Flattened descriptors of this stage and any nested stages.
    fn descriptors(&self) -> Vec<StageDescriptor> {
        vec![StageDescriptor {
            name: self.name().to_string(),
            kind: self.kind(),
        }]
    }

    /// Append this stage's buffers to `out`, keyed by `"<name>.<buffer>"`.
    fn collect_state(&self, out: &mut StateDict) {
        for (buffer, value) in self.buffers() {
            out.insert(format!("{}.{buffer}", self.name()), value);
        }
    }

    /// Load every buffer of this stage present in `state`.
    ///
    /// Returns the number of entries consumed.
    fn restore_state(&mut self, state: &StateDict) -> Result<usize, TransformError> {
        let buffers: Vec<&'static str> = self.buffers().into_iter().map(|(b, _)| b).collect();
        let mut restored = 0;
        for buffer in buffers {
            let key = format!("{}.{buffer}", self.name());
            if let Some(&value) = state.get(&key) {
                self.load_buffer(buffer, value)?;
                restored += 1;
            }
        }
        Ok(restored)
    }
}

/// A stage that maps `I` to [`Output`](Self::Output).
pub trait Transform<I>: Stage {
    type Output;

    fn apply(&mut self, input: I) -> Result<Self::Output, TransformError>;
}

// Borrowed stages compose too, so callers keep ownership of stateful stages
// (e.g. to switch a normaliser's mode between epochs).
impl<S: Stage + ?Sized> Stage for &mut S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> StageKind {
        (**self).kind()
    }

    fn buffers(&self) -> Vec<(&'static str, f64)> {
        (**self).buffers()
    }

    fn load_buffer(&mut self, buffer: &str, value: f64) -> Result<(), TransformError> {
        (**self).load_buffer(buffer, value)
    }

    fn descriptors(&self) -> Vec<StageDescriptor> {
        (**self).descriptors()
    }

    fn collect_state(&self, out: &mut StateDict) {
        (**self).collect_state(out)
    }

    fn restore_state(&mut self, state: &StateDict) -> Result<usize, TransformError> {
        (**self).restore_state(state)
    }
}

impl<I, S: Transform<I> + ?Sized> Transform<I> for &mut S {
    type Output = S::Output;

    fn apply(&mut self, input: I) -> Result<Self::Output, TransformError> {
        (**self).apply(input)
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Two stages run back to back.  Built by [`Pipeline::then`].
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B> {
    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }
}

impl<A: Stage, B: Stage> Stage for Chain<A, B> {
    fn name(&self) -> &str {
        "chain"
    }

    fn kind(&self) -> StageKind {
        if self.first.kind() == StageKind::Stateful || self.second.kind() == StageKind::Stateful {
            StageKind::Stateful
        } else {
            StageKind::Stateless
        }
    }

    fn descriptors(&self) -> Vec<StageDescriptor> {
        let mut out = self.first.descriptors();
        out.extend(self.second.descriptors());
        out
    }

    fn collect_state(&self, out: &mut StateDict) {
        self.first.collect_state(out);
        self.second.collect_state(out);
    }

    fn restore_state(&mut self, state: &StateDict) -> Result<usize, TransformError> {
        Ok(self.first.restore_state(state)? + self.second.restore_state(state)?)
    }
}

impl<I, A, B> Transform<I> for Chain<A, B>
where
    A: Transform<I>,
    B: Transform<A::Output>,
{
    type Output = B::Output;

    fn apply(&mut self, input: I) -> Result<Self::Output, TransformError> {
        let intermediate = self.first.apply(input)?;
        self.second.apply(intermediate)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// An ordered chain of stages invoked as one unit.
#[derive(Debug, Clone)]
pub struct Pipeline<T> {
    inner: T,
}

impl<T: Stage> Pipeline<T> {
    /// Start a pipeline with a single stage.
    pub fn new(stage: T) -> Self {
        Self { inner: stage }
    }

    /// Append `stage` after every stage already in the pipeline.
    pub fn then<S: Stage>(self, stage: S) -> Pipeline<Chain<T, S>> {
        log::trace!("pipeline: appending stage '{}'", stage.name());
        Pipeline {
            inner: Chain {
                first: self.inner,
                second: stage,
            },
        }
    }

    /// Run `input` through every stage in order.
    ///
    /// The first stage error aborts the run and is returned unchanged.
    pub fn run<I>(&mut self, input: I) -> Result<<T as Transform<I>>::Output, TransformError>
    where
        T: Transform<I>,
    {
        self.inner.apply(input)
    }

    /// Descriptors of all stages, in execution order.
    pub fn stages(&self) -> Vec<StageDescriptor> {
        self.inner.descriptors()
    }

    /// Descriptors of the stages that own persistent state.
    pub fn stateful_stages(&self) -> Vec<StageDescriptor> {
        self.stages()
            .into_iter()
            .filter(|d| d.kind == StageKind::Stateful)
            .collect()
    }

    /// Snapshot every stateful stage's buffers.
    ///
    /// # Errors
    ///
    /// [`TransformError::DuplicateStage`] when two stateful stages share a
    /// name.
    pub fn state_dict(&self) -> Result<StateDict, TransformError> {
        self.check_unique_state_names()?;
        let mut out = StateDict::new();
        self.inner.collect_state(&mut out);
        Ok(out)
    }

    /// Restore buffers previously returned by [`state_dict`](Self::state_dict).
    ///
    /// Fails with [`TransformError::UnknownStateKey`] when `state` contains
    /// an entry no stage claims, and with [`TransformError::DuplicateStage`]
    /// when two stateful stages share a name.  Nothing is loaded on error.
    /// Stages whose keys are absent keep their current values.
    pub fn load_state_dict(&mut self, state: &StateDict) -> Result<(), TransformError> {
        let known = self.state_dict()?;
        if let Some(key) = state.keys().find(|k| !known.contains_key(*k)) {
            return Err(TransformError::UnknownStateKey(key.clone()));
        }
        let restored = self.inner.restore_state(state)?;
        log::debug!("pipeline: restored {restored} state entries");
        Ok(())
    }

    fn check_unique_state_names(&self) -> Result<(), TransformError> {
        let mut seen = BTreeSet::new();
        for stage in self.stateful_stages() {
            if !seen.insert(stage.name.clone()) {
                return Err(TransformError::DuplicateStage(stage.name));
            }
        }
        Ok(())
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Stage> Stage for Pipeline<T> {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn kind(&self) -> StageKind {
        self.inner.kind()
    }

    fn descriptors(&self) -> Vec<StageDescriptor> {
        self.inner.descriptors()
    }

    fn collect_state(&self, out: &mut StateDict) {
        self.inner.collect_state(out)
    }

    fn restore_state(&mut self, state: &StateDict) -> Result<usize, TransformError> {
        self.inner.restore_state(state)
    }
}

impl<I, T: Transform<I>> Transform<I> for Pipeline<T> {
    type Output = T::Output;

    fn apply(&mut self, input: I) -> Result<Self::Output, TransformError> {
        self.inner.apply(input)
    }
}

/// Build a [`Pipeline`] from a list of stages.
///
/// `compose!(a, b, c)` is `Pipeline::new(a).then(b).then(c)`.
#[macro_export]
macro_rules! compose {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::transform::Pipeline::new($first)$(.then($rest))*
    };
}

// ---------------------------------------------------------------------------
// FnStage / Identity
// ---------------------------------------------------------------------------

/// A plain function or closure used as a stateless stage.
#[derive(Clone)]
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F> std::fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

/// Wrap `func` as a named stateless stage.
pub fn stage_fn<F>(name: impl Into<String>, func: F) -> FnStage<F> {
    FnStage {
        name: name.into(),
        func,
    }
}

impl<F> Stage for FnStage<F> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<I, O, F> Transform<I> for FnStage<F>
where
    F: FnMut(I) -> Result<O, TransformError>,
{
    type Output = O;

    fn apply(&mut self, input: I) -> Result<O, TransformError> {
        (self.func)(input)
    }
}

/// Returns its input unchanged.  Stands in for training-only stages in
/// evaluation pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Stage for Identity {
    fn name(&self) -> &str {
        "identity"
    }
}

impl<I> Transform<I> for Identity {
    type Output = I;

    fn apply(&mut self, input: I) -> Result<I, TransformError> {
        Ok(input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
