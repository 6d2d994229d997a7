//! Learned strided resampling layers.
//!
//! Both layers use a kernel of twice the stride and no bias. Downsampling
//! replicates edges when padding; upsampling is depthwise.

use crate::error::Result;
use crate::modules::conv::{ConvParams, ConvWeights};
use crate::modules::padding::PaddingMode;
use crate::modules::streaming_conv::{
    StreamableConv1d, StreamableConvState, StreamableConvTranspose1d,
    StreamableConvTransposeState,
};
use crate::state::{StreamBuffer, StreamingModule};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Strided convolution reducing the frame rate by `stride`.
#[derive(Debug, Clone)]
pub struct ConvDownsample1d<B: Backend> {
    pub conv: StreamableConv1d<B>,
}

/// Strided transposed convolution raising the frame rate by `stride`.
#[derive(Debug, Clone)]
pub struct ConvTrUpsample1d<B: Backend> {
    pub convtr: StreamableConvTranspose1d<B>,
}

impl<B: Backend> ConvDownsample1d<B> {
    /// Parameters of the strided kernel: `2 * stride` wide, replicate padding, no bias.
    pub fn params(stride: usize, dim: usize, causal: bool) -> ConvParams {
        ConvParams::new(dim, dim, 2 * stride)
            .with_stride(stride)
            .with_causal(causal)
            .with_pad_mode(PaddingMode::Replicate)
            .with_bias(false)
    }

    /// Create a downsampler with random weights.
    pub fn new(stride: usize, dim: usize, causal: bool, device: &B::Device) -> Result<Self> {
        Ok(Self {
            conv: StreamableConv1d::new(Self::params(stride, dim, causal), device)?,
        })
    }

    /// Build from an existing `[dim, dim, 2 * stride]` kernel.
    pub fn from_weight(
        stride: usize,
        dim: usize,
        causal: bool,
        weight: Tensor<B, 3>,
    ) -> Result<Self> {
        Ok(Self {
            conv: StreamableConv1d::from_weights(
                Self::params(stride, dim, causal),
                ConvWeights::new(weight, None),
            )?,
        })
    }

    /// Full-sequence downsampling.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        self.conv.forward(input)
    }
}

impl<B: Backend> StreamingModule<B> for ConvDownsample1d<B> {
    type State = StreamableConvState<B>;

    fn init_state(&self) -> Self::State {
        self.conv.init_state()
    }

    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>> {
        self.conv.step(state, input)
    }

    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>> {
        self.conv.flush(state)
    }
}

impl<B: Backend> ConvTrUpsample1d<B> {
    /// Parameters of the depthwise kernel: `2 * stride` wide, no bias.
    pub fn params(stride: usize, dim: usize, causal: bool) -> ConvParams {
        ConvParams::new(dim, dim, 2 * stride)
            .with_stride(stride)
            .with_groups(dim)
            .with_causal(causal)
            .with_bias(false)
    }

    /// Create an upsampler with random weights.
    pub fn new(stride: usize, dim: usize, causal: bool, device: &B::Device) -> Result<Self> {
        Ok(Self {
            convtr: StreamableConvTranspose1d::new(Self::params(stride, dim, causal), device)?,
        })
    }

    /// Build from an existing depthwise `[dim, 1, 2 * stride]` kernel.
    pub fn from_weight(
        stride: usize,
        dim: usize,
        causal: bool,
        weight: Tensor<B, 3>,
    ) -> Result<Self> {
        Ok(Self {
            convtr: StreamableConvTranspose1d::from_weights(
                Self::params(stride, dim, causal),
                ConvWeights::new(weight, None),
            )?,
        })
    }

    /// Full-sequence upsampling.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        self.convtr.forward(input)
    }
}

impl<B: Backend> StreamingModule<B> for ConvTrUpsample1d<B> {
    type State = StreamableConvTransposeState<B>;

    fn init_state(&self) -> Self::State {
        self.convtr.init_state()
    }

    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>> {
        self.convtr.step(state, input)
    }

    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>> {
        self.convtr.flush(state)
    }
}
