//! Streaming state helpers shared across streamable layers.
//!
//! This module defines the small generic building blocks used by streaming
//! layers: an optional time-axis buffer, a step counter, the
//! [`StreamingModule`] capability trait and a session type pairing a shared
//! layer with one owned state.

use crate::error::{Error, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::marker::PhantomData;

/// Monotonic counter tracking how much a streaming state has emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStep {
    /// Frames or samples emitted so far.
    pub index: usize,
}

impl StreamStep {
    /// A counter at zero.
    pub fn new() -> Self {
        Self { index: 0 }
    }

    /// Advance by `by`, saturating at `usize::MAX`.
    pub fn increment(&mut self, by: usize) {
        self.index = self.index.saturating_add(by);
    }
}

impl Default for StreamStep {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero or one `[batch, channels, time]` tensor flowing between streaming layers.
///
/// An absent buffer means "no samples yet" and is the identity for [`cat`](Self::cat).
/// Zero-length tensors are normalized to absent.
#[derive(Debug, Clone)]
pub struct StreamBuffer<B: Backend> {
    inner: Option<Tensor<B, 3>>,
}

impl<B: Backend> Default for StreamBuffer<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B: Backend> From<Tensor<B, 3>> for StreamBuffer<B> {
    fn from(tensor: Tensor<B, 3>) -> Self {
        Self::new(tensor)
    }
}

impl<B: Backend> StreamBuffer<B> {
    /// An absent buffer.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Wrap a tensor; zero-length tensors become absent.
    pub fn new(tensor: Tensor<B, 3>) -> Self {
        if tensor.dims()[2] == 0 {
            Self::empty()
        } else {
            Self {
                inner: Some(tensor),
            }
        }
    }

    /// Wrap an optional tensor; `None` and zero-length tensors become absent.
    pub fn from_option(tensor: Option<Tensor<B, 3>>) -> Self {
        tensor.map(Self::new).unwrap_or_default()
    }

    /// Borrow the tensor, if any.
    pub fn as_option(&self) -> Option<&Tensor<B, 3>> {
        self.inner.as_ref()
    }

    /// Unwrap into the tensor, if any.
    pub fn into_option(self) -> Option<Tensor<B, 3>> {
        self.inner
    }

    /// Whether the buffer is absent.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of buffered time steps.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map(|t| t.dims()[2]).unwrap_or(0)
    }

    /// Move the contents out, leaving an absent buffer behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Concatenate along time.
    pub fn cat(self, other: Self) -> Result<Self> {
        match (self.inner, other.inner) {
            (None, rhs) => Ok(Self { inner: rhs }),
            (lhs, None) => Ok(Self { inner: lhs }),
            (Some(lhs), Some(rhs)) => {
                let [lhs_batch, lhs_channels, _] = lhs.dims();
                let [rhs_batch, rhs_channels, _] = rhs.dims();
                if (lhs_batch, lhs_channels) != (rhs_batch, rhs_channels) {
                    return Err(Error::shape(format!(
                        "cannot concatenate [{lhs_batch}, {lhs_channels}, _] with \
                         [{rhs_batch}, {rhs_channels}, _] along time"
                    )));
                }
                Ok(Self::new(Tensor::cat(vec![lhs, rhs], 2)))
            }
        }
    }

    /// Slice `len` time steps starting at `start`.
    pub fn narrow(&self, start: usize, len: usize) -> Result<Self> {
        let total = self.len();
        if start + len > total {
            return Err(Error::shape(format!(
                "narrow {start}..{} out of range for buffer of length {total}",
                start + len
            )));
        }
        match &self.inner {
            Some(tensor) if len > 0 => Ok(Self::new(tensor.clone().narrow(2, start, len))),
            _ => Ok(Self::empty()),
        }
    }

    /// Split into the first `lhs_len` time steps and the remainder.
    pub fn split(self, lhs_len: usize) -> Result<(Self, Self)> {
        let total = self.len();
        if lhs_len > total {
            return Err(Error::shape(format!(
                "split at {lhs_len} exceeds buffer length {total}"
            )));
        }
        let lhs = self.narrow(0, lhs_len)?;
        let rhs = self.narrow(lhs_len, total - lhs_len)?;
        Ok((lhs, rhs))
    }
}

/// Capability shared by every layer that can run chunk by chunk.
///
/// Layers are immutable and take `&self`; all mutable streaming data lives in
/// the associated `State`, owned by the caller's session.
pub trait StreamingModule<B: Backend> {
    /// Concrete state type for this module.
    type State;

    /// Allocate a fresh state for a new stream.
    fn init_state(&self) -> Self::State;

    /// Process one chunk, emitting every output sample that is final.
    ///
    /// On error the state is left untouched.
    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>>;

    /// End the stream, emitting what the full-sequence evaluation would still
    /// produce from the buffered samples. Leaves the state reset.
    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>>;

    /// Discard all buffered data and return to the initial state.
    fn reset_state(&self, state: &mut Self::State) {
        *state = self.init_state();
    }
}

/// One inference session over a shared layer.
///
/// The layer is borrowed read-only, so any number of sessions can run over the
/// same weights; each session owns its state.
pub struct StreamSession<'a, B: Backend, M: StreamingModule<B>> {
    module: &'a M,
    state: M::State,
    _backend: PhantomData<fn() -> B>,
}

impl<'a, B: Backend, M: StreamingModule<B>> StreamSession<'a, B, M> {
    /// Start a session with a fresh state.
    pub fn new(module: &'a M) -> Self {
        Self {
            module,
            state: module.init_state(),
            _backend: PhantomData,
        }
    }

    /// Feed one chunk through the module.
    pub fn step(&mut self, input: impl Into<StreamBuffer<B>>) -> Result<StreamBuffer<B>> {
        self.module.step(&mut self.state, input.into())
    }

    /// End the stream and emit what is still pending.
    pub fn flush(&mut self) -> Result<StreamBuffer<B>> {
        self.module.flush(&mut self.state)
    }

    /// Drop buffered data so the next chunk starts a new stream.
    pub fn reset_state(&mut self) {
        self.module.reset_state(&mut self.state);
    }

    /// Current streaming state.
    pub fn state(&self) -> &M::State {
        &self.state
    }

    /// The shared module.
    pub fn module(&self) -> &'a M {
        self.module
    }
}
