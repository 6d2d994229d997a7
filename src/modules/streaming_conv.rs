//! Streaming-friendly 1D convolution primitives.
//!
//! These layers keep a small buffer so they can process audio in chunks while
//! producing the same result as full-sequence convolution. Convolutions carry
//! unconsumed *input* samples between chunks; transposed convolutions carry the
//! *output* tail that the next chunk still overlaps.

use crate::error::{Error, Result};
use crate::modules::conv::{Conv1d, ConvParams, ConvTranspose1d, ConvWeights};
use crate::modules::padding::{conv_padding, conv_transpose_unpadding, pad1d, unpad1d};
use crate::perf::{self, Metric};
use crate::state::{StreamBuffer, StreamStep, StreamingModule};
use burn::tensor::backend::Backend;
use burn::tensor::{s, Tensor};

/// Streaming convolution state (residual input buffer).
#[derive(Debug, Clone)]
pub struct StreamableConvState<B: Backend> {
    /// Input samples not yet covered by a complete frame.
    pub prev_xs: StreamBuffer<B>,
    /// Whether the causal left padding has been prepended for this stream.
    pub left_pad_applied: bool,
    /// Frames emitted so far.
    pub step: StreamStep,
}

impl<B: Backend> Default for StreamableConvState<B> {
    fn default() -> Self {
        Self {
            prev_xs: StreamBuffer::empty(),
            left_pad_applied: false,
            step: StreamStep::new(),
        }
    }
}

/// Streaming transposed convolution state (unresolved output tail).
#[derive(Debug, Clone)]
pub struct StreamableConvTransposeState<B: Backend> {
    /// Last `kernel_size - stride` output samples, still missing the next
    /// chunk's overlap. Includes the bias.
    pub prev_ys: StreamBuffer<B>,
    /// Output samples emitted so far.
    pub step: StreamStep,
}

impl<B: Backend> Default for StreamableConvTransposeState<B> {
    fn default() -> Self {
        Self {
            prev_ys: StreamBuffer::empty(),
            step: StreamStep::new(),
        }
    }
}

fn check_dense_padding(params: &ConvParams) -> Result<()> {
    if params.padding != 0 {
        return Err(Error::config(
            "streamable layers apply their own padding; dense padding must be 0",
        ));
    }
    Ok(())
}

/// 1D convolution usable over a full sequence or chunk by chunk.
#[derive(Debug, Clone)]
pub struct StreamableConv1d<B: Backend> {
    conv: Conv1d<B>,
}

impl<B: Backend> StreamableConv1d<B> {
    /// Create a layer with randomly initialized weights.
    pub fn new(params: ConvParams, device: &B::Device) -> Result<Self> {
        check_dense_padding(&params)?;
        let conv = Conv1d::new(params, device)?;
        tracing::debug!(params = ?conv.params(), "built streamable conv");
        Ok(Self { conv })
    }

    /// Create a layer from existing weights `[out, in / groups, kernel]`.
    pub fn from_weights(params: ConvParams, weights: ConvWeights<B>) -> Result<Self> {
        check_dense_padding(&params)?;
        Ok(Self {
            conv: Conv1d::from_weights(params, weights)?,
        })
    }

    /// Construction parameters.
    pub fn params(&self) -> &ConvParams {
        self.conv.params()
    }

    /// Underlying dense convolution.
    pub fn conv(&self) -> &Conv1d<B> {
        &self.conv
    }

    /// Padding a full-sequence call needs before its first frame.
    pub fn padding_total(&self) -> usize {
        let params = self.params();
        params.effective_kernel_size().saturating_sub(params.stride)
    }

    /// Full-sequence evaluation with causal or centered padding.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let _span = perf::span(Metric::ConvForward);
        let params = self.params();
        let len = input.dims()[2];
        if len == 0 {
            return Err(Error::shape("cannot convolve an empty sequence"));
        }
        let (left, right) = conv_padding(
            len,
            params.effective_kernel_size(),
            params.stride,
            params.causal,
        );
        let padded = pad1d(input, left, right, params.pad_mode)?;
        self.conv.forward(padded)
    }

    fn check_streamable(&self) -> Result<()> {
        let params = self.params();
        if !params.causal {
            return Err(Error::config(
                "streaming requires causal padding; pre-pad centered inputs and use forward",
            ));
        }
        if params.effective_kernel_size() < params.stride {
            return Err(Error::config(format!(
                "effective kernel {} shorter than stride {} cannot stream",
                params.effective_kernel_size(),
                params.stride
            )));
        }
        Ok(())
    }
}

impl<B: Backend> StreamingModule<B> for StreamableConv1d<B> {
    type State = StreamableConvState<B>;

    fn init_state(&self) -> Self::State {
        StreamableConvState::default()
    }

    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>> {
        let Some(input) = input.into_option() else {
            return Ok(StreamBuffer::empty());
        };
        let _span = perf::span(Metric::ConvStep);
        self.check_streamable()?;
        let params = self.params();
        let channels = input.dims()[1];
        if channels != params.in_channels {
            return Err(Error::shape(format!(
                "conv expects {} input channels, got {channels}",
                params.in_channels
            )));
        }

        let input = if state.left_pad_applied {
            input
        } else {
            pad1d(input, self.padding_total(), 0, params.pad_mode)?
        };
        let merged = state.prev_xs.clone().cat(StreamBuffer::new(input))?;

        let stride = params.stride;
        let kernel = params.effective_kernel_size();
        let seq_len = merged.len();
        let num_frames = (seq_len + stride).saturating_sub(kernel) / stride;
        if num_frames == 0 {
            tracing::trace!(seq_len, kernel, "conv step buffered without a full frame");
            state.prev_xs = merged;
            state.left_pad_applied = true;
            return Ok(StreamBuffer::empty());
        }

        let offset = num_frames * stride;
        let consumed = (num_frames - 1) * stride + kernel;
        let residual = merged.narrow(offset, seq_len - offset)?;
        let Some(frames) = merged.narrow(0, consumed)?.into_option() else {
            return Err(Error::shape("conv step produced an empty frame window"));
        };
        let output = self.conv.forward(frames)?;

        tracing::trace!(num_frames, residual = residual.len(), "conv step");
        state.prev_xs = residual;
        state.left_pad_applied = true;
        state.step.increment(num_frames);
        perf::add_count(Metric::ConvFrames, num_frames as u64);
        Ok(StreamBuffer::new(output))
    }

    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>> {
        let _span = perf::span(Metric::ConvFlush);
        let params = self.params();
        let kernel = params.effective_kernel_size();
        let residual = state.prev_xs.len();
        // The full-sequence right padding completes one more frame unless the
        // residual is exactly the overlap of the last emitted frame.
        let pending = residual > 0 && (state.step.index == 0 || residual + params.stride > kernel);
        let output = match state.prev_xs.as_option() {
            Some(tail) if pending => {
                let padded = pad1d(
                    tail.clone(),
                    0,
                    kernel.saturating_sub(residual),
                    params.pad_mode,
                )?;
                StreamBuffer::new(self.conv.forward(padded)?)
            }
            _ => StreamBuffer::empty(),
        };
        tracing::trace!(residual, frames = output.len(), "conv flush");
        perf::add_count(Metric::ConvFrames, output.len() as u64);
        self.reset_state(state);
        Ok(output)
    }
}

/// 1D transposed convolution usable over a full sequence or chunk by chunk.
#[derive(Debug, Clone)]
pub struct StreamableConvTranspose1d<B: Backend> {
    convtr: ConvTranspose1d<B>,
}

impl<B: Backend> StreamableConvTranspose1d<B> {
    /// Create a layer with randomly initialized weights.
    pub fn new(params: ConvParams, device: &B::Device) -> Result<Self> {
        check_dense_padding(&params)?;
        let convtr = ConvTranspose1d::new(params, device)?;
        tracing::debug!(params = ?convtr.params(), "built streamable transposed conv");
        Ok(Self { convtr })
    }

    /// Create a layer from existing weights `[in, out / groups, kernel]`.
    pub fn from_weights(params: ConvParams, weights: ConvWeights<B>) -> Result<Self> {
        check_dense_padding(&params)?;
        Ok(Self {
            convtr: ConvTranspose1d::from_weights(params, weights)?,
        })
    }

    /// Construction parameters.
    pub fn params(&self) -> &ConvParams {
        self.convtr.params()
    }

    /// Underlying dense transposed convolution.
    pub fn convtr(&self) -> &ConvTranspose1d<B> {
        &self.convtr
    }

    /// Output samples held back after each step.
    pub fn invalid_steps(&self) -> usize {
        let params = self.params();
        params.kernel_size.saturating_sub(params.stride)
    }

    /// Full-sequence evaluation, trimming the implicit transposed padding.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let _span = perf::span(Metric::ConvTransposeForward);
        let params = self.params();
        let output = self.convtr.forward(input)?;
        let (left, right) =
            conv_transpose_unpadding(params.kernel_size, params.stride, params.causal);
        unpad1d(output, left, right)
    }

    /// Subtract the bias once from a stored tail.
    ///
    /// The tail and the next chunk's head both include a full bias term; the
    /// overlap-add must count it only once.
    pub fn remove_bias_from_tail(&self, tail: Tensor<B, 3>) -> Tensor<B, 3> {
        match &self.convtr.weights().bias {
            Some(bias) => {
                let channels = bias.dims()[0];
                tail - bias.clone().reshape([1, channels, 1])
            }
            None => tail,
        }
    }

    fn check_streamable(&self) -> Result<()> {
        let params = self.params();
        if !params.causal {
            return Err(Error::config(
                "streaming requires causal trimming; use forward for centered layers",
            ));
        }
        if params.kernel_size < params.stride {
            return Err(Error::config(format!(
                "kernel {} shorter than stride {} cannot stream",
                params.kernel_size, params.stride
            )));
        }
        Ok(())
    }
}

impl<B: Backend> StreamingModule<B> for StreamableConvTranspose1d<B> {
    type State = StreamableConvTransposeState<B>;

    fn init_state(&self) -> Self::State {
        StreamableConvTransposeState::default()
    }

    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>> {
        let Some(input) = input.into_option() else {
            return Ok(StreamBuffer::empty());
        };
        let _span = perf::span(Metric::ConvTransposeStep);
        self.check_streamable()?;

        let ys = self.convtr.forward(input)?;
        let [batch, channels, total_len] = ys.dims();
        let ys = match state.prev_ys.as_option() {
            Some(prev) => {
                let [prev_batch, prev_channels, prev_len] = prev.dims();
                if (prev_batch, prev_channels) != (batch, channels) {
                    return Err(Error::shape(format!(
                        "chunk output [{batch}, {channels}, _] does not match pending tail \
                         [{prev_batch}, {prev_channels}, _]"
                    )));
                }
                let tail = self.remove_bias_from_tail(prev.clone());
                let head = ys.clone().narrow(2, 0, prev_len) + tail;
                ys.slice_assign(s![.., .., 0..prev_len], head)
            }
            None => ys,
        };

        let emit_len = total_len - self.invalid_steps();
        let (emit, tail) = StreamBuffer::new(ys).split(emit_len)?;
        tracing::trace!(
            emitted = emit.len(),
            pending = tail.len(),
            "conv transpose step"
        );
        state.prev_ys = tail;
        state.step.increment(emit.len());
        perf::add_count(Metric::ConvTransposeSamples, emit.len() as u64);
        Ok(emit)
    }

    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>> {
        // The pending tail is exactly what the causal full-sequence call trims.
        tracing::trace!(dropped = state.prev_ys.len(), "conv transpose flush");
        self.reset_state(state);
        Ok(StreamBuffer::empty())
    }
}
