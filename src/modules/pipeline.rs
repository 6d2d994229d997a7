//! Ordered stacks of streaming layers.
//!
//! A [`Pipeline`] owns its layers; a [`PipelineState`] holds one state per
//! layer at the same index. Layers never reference each other's state.

use crate::config::{LayerConfig, PipelineConfig};
use crate::error::{Error, Result};
use crate::modules::resample::{ConvDownsample1d, ConvTrUpsample1d};
use crate::modules::streaming_conv::{
    StreamableConv1d, StreamableConvState, StreamableConvTranspose1d,
    StreamableConvTransposeState,
};
use crate::perf::{self, Metric};
use crate::state::{StreamBuffer, StreamingModule};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// One layer of a [`Pipeline`].
#[derive(Debug, Clone)]
pub enum StreamingLayer<B: Backend> {
    /// Plain streamable convolution.
    Conv(StreamableConv1d<B>),
    /// Plain streamable transposed convolution.
    ConvTranspose(StreamableConvTranspose1d<B>),
    /// Strided downsampling convolution.
    Downsample(ConvDownsample1d<B>),
    /// Strided upsampling transposed convolution.
    Upsample(ConvTrUpsample1d<B>),
}

/// Streaming state of one pipeline layer.
#[derive(Debug, Clone)]
pub enum StreamingLayerState<B: Backend> {
    /// Residual input of a convolution or downsample layer.
    Conv(StreamableConvState<B>),
    /// Pending output tail of a transposed convolution or upsample layer.
    ConvTranspose(StreamableConvTransposeState<B>),
}

impl<B: Backend> StreamingLayer<B> {
    /// Build a layer with random weights from its config entry.
    pub fn from_config(config: &LayerConfig, device: &B::Device) -> Result<Self> {
        Ok(match config {
            LayerConfig::Conv(conv) => Self::Conv(StreamableConv1d::new(conv.to_params(), device)?),
            LayerConfig::ConvTranspose(conv) => {
                Self::ConvTranspose(StreamableConvTranspose1d::new(conv.to_params(), device)?)
            }
            LayerConfig::Downsample(resample) => Self::Downsample(ConvDownsample1d::new(
                resample.stride,
                resample.dim,
                resample.causal,
                device,
            )?),
            LayerConfig::Upsample(resample) => Self::Upsample(ConvTrUpsample1d::new(
                resample.stride,
                resample.dim,
                resample.causal,
                device,
            )?),
        })
    }

    /// Channels the layer consumes.
    pub fn in_channels(&self) -> usize {
        match self {
            Self::Conv(conv) => conv.params().in_channels,
            Self::ConvTranspose(convtr) => convtr.params().in_channels,
            Self::Downsample(down) => down.conv.params().in_channels,
            Self::Upsample(up) => up.convtr.params().in_channels,
        }
    }

    /// Channels the layer produces.
    pub fn out_channels(&self) -> usize {
        match self {
            Self::Conv(conv) => conv.params().out_channels,
            Self::ConvTranspose(convtr) => convtr.params().out_channels,
            Self::Downsample(down) => down.conv.params().out_channels,
            Self::Upsample(up) => up.convtr.params().out_channels,
        }
    }

    /// Full-sequence evaluation of this layer.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        match self {
            Self::Conv(conv) => conv.forward(input),
            Self::ConvTranspose(convtr) => convtr.forward(input),
            Self::Downsample(down) => down.forward(input),
            Self::Upsample(up) => up.forward(input),
        }
    }

    /// Fresh state matching this layer's kind.
    pub fn init_state(&self) -> StreamingLayerState<B> {
        match self {
            Self::Conv(conv) => StreamingLayerState::Conv(conv.init_state()),
            Self::ConvTranspose(convtr) => StreamingLayerState::ConvTranspose(convtr.init_state()),
            Self::Downsample(down) => StreamingLayerState::Conv(down.init_state()),
            Self::Upsample(up) => StreamingLayerState::ConvTranspose(up.init_state()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Conv(_) => "conv",
            Self::ConvTranspose(_) => "conv_transpose",
            Self::Downsample(_) => "downsample",
            Self::Upsample(_) => "upsample",
        }
    }
}

/// Per-layer states for one stream through a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineState<B: Backend> {
    layers: Vec<StreamingLayerState<B>>,
}

impl<B: Backend> PipelineState<B> {
    /// Wrap layer states in pipeline order.
    pub fn new(layers: Vec<StreamingLayerState<B>>) -> Self {
        Self { layers }
    }

    /// Layer states in pipeline order.
    pub fn layers(&self) -> &[StreamingLayerState<B>] {
        &self.layers
    }
}

/// Layers applied in order, each feeding the next.
#[derive(Debug, Clone)]
pub struct Pipeline<B: Backend> {
    layers: Vec<StreamingLayer<B>>,
}

impl<B: Backend> Pipeline<B> {
    /// Chain layers, checking that adjacent channel counts agree.
    pub fn new(layers: Vec<StreamingLayer<B>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::config("pipeline needs at least one layer"));
        }
        for (index, pair) in layers.windows(2).enumerate() {
            let (out, next_in) = (pair[0].out_channels(), pair[1].in_channels());
            if out != next_in {
                return Err(Error::config(format!(
                    "layer {index} ({}) emits {out} channels but layer {} ({}) expects {next_in}",
                    pair[0].kind(),
                    index + 1,
                    pair[1].kind()
                )));
            }
        }
        tracing::debug!(
            layers = layers.len(),
            kinds = ?layers.iter().map(StreamingLayer::kind).collect::<Vec<_>>(),
            "built pipeline"
        );
        Ok(Self { layers })
    }

    /// Build every configured layer with random weights.
    pub fn from_config(config: &PipelineConfig, device: &B::Device) -> Result<Self> {
        let layers = config
            .layers
            .iter()
            .map(|layer| StreamingLayer::from_config(layer, device))
            .collect::<Result<Vec<_>>>()?;
        Self::new(layers)
    }

    /// Layers in order.
    pub fn layers(&self) -> &[StreamingLayer<B>] {
        &self.layers
    }

    /// Channels the first layer consumes.
    pub fn in_channels(&self) -> usize {
        self.layers
            .first()
            .map(StreamingLayer::in_channels)
            .unwrap_or(0)
    }

    /// Channels the last layer produces.
    pub fn out_channels(&self) -> usize {
        self.layers
            .last()
            .map(StreamingLayer::out_channels)
            .unwrap_or(0)
    }

    /// Run every layer over a full sequence.
    pub fn forward(&self, mut input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let _span = perf::span(Metric::PipelineForward);
        for layer in &self.layers {
            input = layer.forward(input)?;
        }
        Ok(input)
    }

    fn check_state(&self, state: &PipelineState<B>) -> Result<()> {
        if state.layers.len() != self.layers.len() {
            return Err(Error::StateMismatch {
                index: state.layers.len().min(self.layers.len()),
            });
        }
        Ok(())
    }
}

fn step_layer<B: Backend>(
    index: usize,
    layer: &StreamingLayer<B>,
    state: &mut StreamingLayerState<B>,
    input: StreamBuffer<B>,
) -> Result<StreamBuffer<B>> {
    match (layer, state) {
        (StreamingLayer::Conv(conv), StreamingLayerState::Conv(state)) => conv.step(state, input),
        (StreamingLayer::Downsample(down), StreamingLayerState::Conv(state)) => {
            down.step(state, input)
        }
        (StreamingLayer::ConvTranspose(convtr), StreamingLayerState::ConvTranspose(state)) => {
            convtr.step(state, input)
        }
        (StreamingLayer::Upsample(up), StreamingLayerState::ConvTranspose(state)) => {
            up.step(state, input)
        }
        _ => Err(Error::StateMismatch { index }),
    }
}

fn flush_layer<B: Backend>(
    index: usize,
    layer: &StreamingLayer<B>,
    state: &mut StreamingLayerState<B>,
) -> Result<StreamBuffer<B>> {
    match (layer, state) {
        (StreamingLayer::Conv(conv), StreamingLayerState::Conv(state)) => conv.flush(state),
        (StreamingLayer::Downsample(down), StreamingLayerState::Conv(state)) => down.flush(state),
        (StreamingLayer::ConvTranspose(convtr), StreamingLayerState::ConvTranspose(state)) => {
            convtr.flush(state)
        }
        (StreamingLayer::Upsample(up), StreamingLayerState::ConvTranspose(state)) => {
            up.flush(state)
        }
        _ => Err(Error::StateMismatch { index }),
    }
}

impl<B: Backend> StreamingModule<B> for Pipeline<B> {
    type State = PipelineState<B>;

    fn init_state(&self) -> Self::State {
        PipelineState::new(self.layers.iter().map(StreamingLayer::init_state).collect())
    }

    fn step(&self, state: &mut Self::State, input: StreamBuffer<B>) -> Result<StreamBuffer<B>> {
        let _span = perf::span(Metric::PipelineStep);
        self.check_state(state)?;
        // Work on a copy so a failure in a later layer leaves every layer untouched.
        let mut next = state.clone();
        let mut carried = input;
        for (index, (layer, layer_state)) in
            self.layers.iter().zip(next.layers.iter_mut()).enumerate()
        {
            carried = step_layer(index, layer, layer_state, carried)?;
        }
        *state = next;
        Ok(carried)
    }

    fn flush(&self, state: &mut Self::State) -> Result<StreamBuffer<B>> {
        let _span = perf::span(Metric::PipelineFlush);
        self.check_state(state)?;
        let mut next = state.clone();
        let mut carried = StreamBuffer::empty();
        for (index, (layer, layer_state)) in
            self.layers.iter().zip(next.layers.iter_mut()).enumerate()
        {
            let emitted = step_layer(index, layer, layer_state, carried)?;
            let tail = flush_layer(index, layer, layer_state)?;
            carried = emitted.cat(tail)?;
        }
        *state = next;
        tracing::debug!(samples = carried.len(), "pipeline flushed");
        Ok(carried)
    }
}
