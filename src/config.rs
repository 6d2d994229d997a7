//! Configuration types for streaming convolution pipelines.
//!
//! Pipelines are typically loaded from YAML files using [`load_config`]:
//!
//! ```yaml
//! layers:
//!   - kind: conv
//!     in_channels: 1
//!     out_channels: 8
//!     kernel_size: 7
//!   - kind: downsample
//!     dim: 8
//!     stride: 4
//!   - kind: upsample
//!     dim: 8
//!     stride: 4
//! ```

use crate::modules::conv::ConvParams;
use crate::modules::padding::PaddingMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Convolution or transposed convolution layer settings.
pub struct ConvLayerConfig {
    /// Input channel count.
    pub in_channels: usize,
    /// Output channel count.
    pub out_channels: usize,
    /// Kernel size in samples.
    pub kernel_size: usize,
    /// Stride in samples.
    #[serde(default = "one")]
    pub stride: usize,
    /// Dilation factor (convolution only).
    #[serde(default = "one")]
    pub dilation: usize,
    /// Channel groups.
    #[serde(default = "one")]
    pub groups: usize,
    /// Causal (left) padding; `false` centers it.
    #[serde(default = "yes")]
    pub causal: bool,
    /// `constant` (zero) or `replicate` (edge).
    #[serde(default)]
    pub pad_mode: PaddingMode,
    /// Whether the layer carries a bias.
    #[serde(default = "yes")]
    pub bias: bool,
}

impl ConvLayerConfig {
    /// Layer parameters for these settings.
    pub fn to_params(&self) -> ConvParams {
        ConvParams::new(self.in_channels, self.out_channels, self.kernel_size)
            .with_stride(self.stride)
            .with_dilation(self.dilation)
            .with_groups(self.groups)
            .with_causal(self.causal)
            .with_pad_mode(self.pad_mode)
            .with_bias(self.bias)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Learned resampling layer settings.
pub struct ResampleLayerConfig {
    /// Channel count, unchanged by the layer.
    pub dim: usize,
    /// Resampling factor.
    pub stride: usize,
    /// Causal (left) padding; `false` centers it.
    #[serde(default = "yes")]
    pub causal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// One pipeline layer, tagged by `kind`.
pub enum LayerConfig {
    Conv(ConvLayerConfig),
    ConvTranspose(ConvLayerConfig),
    /// Strided convolution with a `2 * stride` kernel.
    Downsample(ResampleLayerConfig),
    /// Depthwise transposed convolution with a `2 * stride` kernel.
    Upsample(ResampleLayerConfig),
}

impl LayerConfig {
    /// Channels the layer consumes.
    pub fn in_channels(&self) -> usize {
        match self {
            LayerConfig::Conv(conv) | LayerConfig::ConvTranspose(conv) => conv.in_channels,
            LayerConfig::Downsample(resample) | LayerConfig::Upsample(resample) => resample.dim,
        }
    }

    /// Channels the layer produces.
    pub fn out_channels(&self) -> usize {
        match self {
            LayerConfig::Conv(conv) | LayerConfig::ConvTranspose(conv) => conv.out_channels,
            LayerConfig::Downsample(resample) | LayerConfig::Upsample(resample) => resample.dim,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Ordered stack of streaming layers.
pub struct PipelineConfig {
    pub layers: Vec<LayerConfig>,
}

impl PipelineConfig {
    /// Parse a YAML pipeline description.
    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(data)?;
        if config.layers.is_empty() {
            anyhow::bail!("Pipeline config has no layers");
        }
        Ok(config)
    }

    /// Input channels of the first layer.
    pub fn in_channels(&self) -> Option<usize> {
        self.layers.first().map(LayerConfig::in_channels)
    }
}

/// Load a YAML pipeline configuration from disk.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<PipelineConfig> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config = PipelineConfig::from_yaml(&data)?;
    tracing::debug!(
        path = %path.display(),
        layers = config.layers.len(),
        "loaded pipeline config"
    );
    Ok(config)
}
