//! # streamconv - Streaming 1D convolutions
//!
//! Convolution and transposed-convolution layers that can run either over a
//! whole buffered sequence or chunk by chunk, with the chunked output matching
//! the full-sequence output. These are the building blocks of streaming
//! SEANet-style audio encoders and decoders.
//!
//! ## Architecture Overview
//!
//! 1. **Dense operators** ([`modules::conv`]): stateless `conv1d` and
//!    `conv_transpose1d` on `[batch, channels, time]` tensors.
//!
//! 2. **Padding policy** ([`modules::padding`]): causal or centered padding so
//!    that output length depends only on stride, plus the frame arithmetic.
//!
//! 3. **Streamable layers** ([`StreamableConv1d`], [`StreamableConvTranspose1d`]):
//!    keep a residual input buffer or an overlap-add output tail between chunks.
//!
//! 4. **Pipelines** ([`Pipeline`]): ordered layer stacks with one state per
//!    layer, buildable from YAML via [`load_config`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn::tensor::{Distribution, Tensor};
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use streamconv::{ConvParams, StreamSession, StreamableConv1d};
//!
//! let device = NdArrayDevice::default();
//! let conv = StreamableConv1d::<NdArray<f32>>::new(
//!     ConvParams::new(1, 8, 4).with_stride(2),
//!     &device,
//! )
//! .unwrap();
//!
//! let audio = Tensor::random([1, 1, 480], Distribution::Uniform(-1.0, 1.0), &device);
//! let full = conv.forward(audio.clone()).unwrap();
//!
//! let mut session = StreamSession::new(&conv);
//! let mut frames = 0;
//! for start in (0..480).step_by(160) {
//!     frames += session.step(audio.clone().narrow(2, start, 160)).unwrap().len();
//! }
//! frames += session.flush().unwrap().len();
//! assert_eq!(frames, full.dims()[2]);
//! ```

pub mod config;
pub mod error;
pub mod modules;
pub mod perf;
pub mod state;

pub use config::{load_config, LayerConfig, PipelineConfig};
pub use error::{Error, Result};
pub use modules::conv::{Conv1d, ConvParams, ConvTranspose1d, ConvWeights};
pub use modules::padding::PaddingMode;
pub use modules::pipeline::{Pipeline, PipelineState, StreamingLayer, StreamingLayerState};
pub use modules::resample::{ConvDownsample1d, ConvTrUpsample1d};
pub use modules::streaming_conv::{
    StreamableConv1d, StreamableConvState, StreamableConvTranspose1d,
    StreamableConvTransposeState,
};
pub use state::{StreamBuffer, StreamSession, StreamStep, StreamingModule};
