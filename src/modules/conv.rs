//! Dense (non-streaming) 1D convolution and transposed convolution.
//!
//! These operators work on a fixed-size `[batch, channels, time]` input and
//! never pad on their own beyond the explicit `padding` parameter; the padding
//! policy lives in [`crate::modules::padding`].

use crate::error::{Error, Result};
use crate::modules::padding::{effective_kernel_size, PaddingMode};
use burn::tensor::backend::Backend;
use burn::tensor::module::{conv1d, conv_transpose1d};
use burn::tensor::ops::{ConvOptions, ConvTransposeOptions};
use burn::tensor::{Distribution, Tensor};

/// Construction parameters shared by convolution layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvParams {
    /// Input channel count.
    pub in_channels: usize,
    /// Output channel count.
    pub out_channels: usize,
    /// Kernel size in samples.
    pub kernel_size: usize,
    /// Stride in samples.
    pub stride: usize,
    /// Dilation factor.
    pub dilation: usize,
    /// Number of groups; must divide both channel counts.
    pub groups: usize,
    /// Symmetric padding applied by the dense operator itself.
    pub padding: usize,
    /// Causal (left) or centered padding for full-sequence evaluation.
    pub causal: bool,
    /// Padding mode for full-sequence and streaming evaluation.
    pub pad_mode: PaddingMode,
    /// Whether the layer carries a bias.
    pub bias: bool,
}

impl ConvParams {
    /// Causal, unstrided, ungrouped parameters with bias.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            dilation: 1,
            groups: 1,
            padding: 0,
            causal: true,
            pad_mode: PaddingMode::Constant,
            bias: true,
        }
    }

    /// Set the stride.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Set the dilation factor.
    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    /// Set the group count.
    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Set the padding the dense operator applies on both sides.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Choose causal (`true`) or centered padding.
    pub fn with_causal(mut self, causal: bool) -> Self {
        self.causal = causal;
        self
    }

    /// Set the padding mode.
    pub fn with_pad_mode(mut self, pad_mode: PaddingMode) -> Self {
        self.pad_mode = pad_mode;
        self
    }

    /// Enable or disable the bias.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Kernel width once dilation is applied.
    pub fn effective_kernel_size(&self) -> usize {
        effective_kernel_size(self.kernel_size, self.dilation)
    }

    /// Check the invariants every convolution layer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(Error::config("channel counts must be at least 1"));
        }
        if self.kernel_size == 0 {
            return Err(Error::config("kernel_size must be at least 1"));
        }
        if self.stride == 0 {
            return Err(Error::config("stride must be at least 1"));
        }
        if self.dilation == 0 {
            return Err(Error::config("dilation must be at least 1"));
        }
        if self.groups == 0
            || self.in_channels % self.groups != 0
            || self.out_channels % self.groups != 0
        {
            return Err(Error::config(format!(
                "groups={} must divide in_channels={} and out_channels={}",
                self.groups, self.in_channels, self.out_channels
            )));
        }
        Ok(())
    }
}

/// Weight and optional bias owned by one convolution layer.
#[derive(Debug, Clone)]
pub struct ConvWeights<B: Backend> {
    /// Kernel tensor (layout depends on the operator).
    pub weight: Tensor<B, 3>,
    /// Optional bias `[out_channels]`.
    pub bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> ConvWeights<B> {
    /// Bundle a weight tensor with an optional bias.
    pub fn new(weight: Tensor<B, 3>, bias: Option<Tensor<B, 1>>) -> Self {
        Self { weight, bias }
    }

    /// Uniform init in `±1/sqrt(fan_in)`, zero bias.
    fn init(
        shape: [usize; 3],
        fan_in: usize,
        out_channels: usize,
        bias: bool,
        device: &B::Device,
    ) -> Self {
        let scale = (1.0 / fan_in as f64).sqrt();
        let weight = Tensor::random(shape, Distribution::Uniform(-scale, scale), device);
        let bias = bias.then(|| Tensor::zeros([out_channels], device));
        Self { weight, bias }
    }

    fn check(&self, expected: [usize; 3], params: &ConvParams) -> Result<()> {
        let actual = self.weight.dims();
        if actual != expected {
            return Err(Error::config(format!(
                "weight shape {actual:?} does not match expected {expected:?}"
            )));
        }
        match (&self.bias, params.bias) {
            (Some(bias), true) if bias.dims() == [params.out_channels] => Ok(()),
            (Some(bias), true) => Err(Error::config(format!(
                "bias shape {:?} does not match [{}]",
                bias.dims(),
                params.out_channels
            ))),
            (None, false) => Ok(()),
            (Some(_), false) => Err(Error::config("bias given for a layer without bias")),
            (None, true) => Err(Error::config("missing bias for a layer with bias")),
        }
    }
}

/// Stateless 1D convolution.
#[derive(Debug, Clone)]
pub struct Conv1d<B: Backend> {
    params: ConvParams,
    weights: ConvWeights<B>,
}

impl<B: Backend> Conv1d<B> {
    /// Create a convolution with randomly initialized weights.
    pub fn new(params: ConvParams, device: &B::Device) -> Result<Self> {
        params.validate()?;
        let weights = ConvWeights::init(
            Self::weight_shape(&params),
            params.in_channels * params.kernel_size,
            params.out_channels,
            params.bias,
            device,
        );
        Ok(Self { params, weights })
    }

    /// Create a convolution from existing weights `[out, in / groups, kernel]`.
    pub fn from_weights(params: ConvParams, weights: ConvWeights<B>) -> Result<Self> {
        params.validate()?;
        weights.check(Self::weight_shape(&params), &params)?;
        Ok(Self { params, weights })
    }

    /// Weight layout `[out_channels, in_channels / groups, kernel_size]`.
    pub fn weight_shape(params: &ConvParams) -> [usize; 3] {
        [
            params.out_channels,
            params.in_channels / params.groups.max(1),
            params.kernel_size,
        ]
    }

    /// Construction parameters.
    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    /// Kernel and bias.
    pub fn weights(&self) -> &ConvWeights<B> {
        &self.weights
    }

    /// Convolve `[batch, in_channels, time]` into `[batch, out_channels, frames]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [_, channels, len] = input.dims();
        let params = &self.params;
        if channels != params.in_channels {
            return Err(Error::shape(format!(
                "conv expects {} input channels, got {channels}",
                params.in_channels
            )));
        }
        let kernel = params.effective_kernel_size();
        if len == 0 || len + 2 * params.padding < kernel {
            return Err(Error::shape(format!(
                "input of length {len} is shorter than the effective kernel {kernel}"
            )));
        }
        Ok(conv1d(
            input,
            self.weights.weight.clone(),
            self.weights.bias.clone(),
            ConvOptions::new(
                [params.stride],
                [params.padding],
                [params.dilation],
                params.groups,
            ),
        ))
    }
}

/// Stateless 1D transposed convolution.
#[derive(Debug, Clone)]
pub struct ConvTranspose1d<B: Backend> {
    params: ConvParams,
    weights: ConvWeights<B>,
}

impl<B: Backend> ConvTranspose1d<B> {
    /// Create a transposed convolution with randomly initialized weights.
    pub fn new(params: ConvParams, device: &B::Device) -> Result<Self> {
        Self::validate(&params)?;
        let weights = ConvWeights::init(
            Self::weight_shape(&params),
            params.in_channels * params.kernel_size,
            params.out_channels,
            params.bias,
            device,
        );
        Ok(Self { params, weights })
    }

    /// Create a transposed convolution from weights `[in, out / groups, kernel]`.
    pub fn from_weights(params: ConvParams, weights: ConvWeights<B>) -> Result<Self> {
        Self::validate(&params)?;
        weights.check(Self::weight_shape(&params), &params)?;
        Ok(Self { params, weights })
    }

    fn validate(params: &ConvParams) -> Result<()> {
        params.validate()?;
        if params.dilation != 1 {
            return Err(Error::config(
                "transposed convolution does not support dilation",
            ));
        }
        Ok(())
    }

    /// Weight layout `[in_channels, out_channels / groups, kernel_size]`.
    pub fn weight_shape(params: &ConvParams) -> [usize; 3] {
        [
            params.in_channels,
            params.out_channels / params.groups.max(1),
            params.kernel_size,
        ]
    }

    /// Construction parameters.
    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    /// Kernel and bias.
    pub fn weights(&self) -> &ConvWeights<B> {
        &self.weights
    }

    /// Upsample `[batch, in_channels, time]` to
    /// `[batch, out_channels, (time - 1) * stride - 2 * padding + kernel_size]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [_, channels, len] = input.dims();
        let params = &self.params;
        if channels != params.in_channels {
            return Err(Error::shape(format!(
                "transposed conv expects {} input channels, got {channels}",
                params.in_channels
            )));
        }
        if len == 0 || (len - 1) * params.stride + params.kernel_size <= 2 * params.padding {
            return Err(Error::shape(format!(
                "input of length {len} produces no output with padding {}",
                params.padding
            )));
        }
        Ok(conv_transpose1d(
            input,
            self.weights.weight.clone(),
            self.weights.bias.clone(),
            ConvTransposeOptions::new(
                [params.stride],
                [params.padding],
                [0],
                [1],
                params.groups,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn tensor3(data: Vec<Vec<Vec<f32>>>, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
        let shape = [data.len(), data[0].len(), data[0][0].len()];
        let flat: Vec<f32> = data.into_iter().flatten().flatten().collect();
        Tensor::from_data(TensorData::new(flat, shape), device)
    }

    fn to_vec(tensor: Tensor<TestBackend, 3>) -> Vec<f32> {
        tensor.to_data().to_vec::<f32>().expect("f32 data")
    }

    fn conv(
        params: ConvParams,
        weight: Vec<Vec<Vec<f32>>>,
        bias: Option<Vec<f32>>,
    ) -> Conv1d<TestBackend> {
        let device = NdArrayDevice::default();
        let bias = bias.map(|b| {
            let len = b.len();
            Tensor::from_data(TensorData::new(b, [len]), &device)
        });
        Conv1d::from_weights(params, ConvWeights::new(tensor3(weight, &device), bias))
            .expect("conv")
    }

    #[test]
    fn conv_stride_and_dilation() {
        let device = NdArrayDevice::default();
        let input = tensor3(vec![vec![vec![1.0, 2.0, 3.0, 4.0]]], &device);

        let plain = conv(
            ConvParams::new(1, 1, 2).with_bias(false),
            vec![vec![vec![1.0, 2.0]]],
            None,
        );
        let output = plain.forward(input.clone()).expect("forward");
        assert_eq!(to_vec(output), vec![5.0, 8.0, 11.0]);

        let strided = conv(
            ConvParams::new(1, 1, 2).with_stride(2).with_bias(false),
            vec![vec![vec![1.0, 2.0]]],
            None,
        );
        let output = strided.forward(input.clone()).expect("forward");
        assert_eq!(to_vec(output), vec![5.0, 11.0]);

        let dilated = conv(
            ConvParams::new(1, 1, 2).with_dilation(2),
            vec![vec![vec![1.0, 1.0]]],
            Some(vec![0.5]),
        );
        let output = dilated.forward(input).expect("forward");
        assert_eq!(to_vec(output), vec![4.5, 6.5]);
    }

    #[test]
    fn grouped_conv_keeps_channels_apart() {
        let device = NdArrayDevice::default();
        let layer = conv(
            ConvParams::new(2, 2, 1).with_groups(2).with_bias(false),
            vec![vec![vec![2.0]], vec![vec![3.0]]],
            None,
        );
        let input = tensor3(vec![vec![vec![1.0, 2.0], vec![3.0, 4.0]]], &device);
        let output = layer.forward(input).expect("forward");
        assert_eq!(to_vec(output), vec![2.0, 4.0, 9.0, 12.0]);
    }

    #[test]
    fn conv_rejects_short_input_and_channel_mismatch() {
        let device = NdArrayDevice::default();
        let layer = Conv1d::<TestBackend>::new(ConvParams::new(2, 3, 3).with_dilation(2), &device)
            .expect("conv");
        let short = Tensor::<TestBackend, 3>::zeros([1, 2, 4], &device);
        assert!(matches!(layer.forward(short), Err(Error::Shape(_))));
        let mono = Tensor::<TestBackend, 3>::zeros([1, 1, 8], &device);
        assert!(matches!(layer.forward(mono), Err(Error::Shape(_))));
        let ok = Tensor::<TestBackend, 3>::zeros([2, 2, 8], &device);
        assert_eq!(layer.forward(ok).expect("forward").dims(), [2, 3, 4]);
    }

    #[test]
    fn invalid_params_are_config_errors() {
        let device = NdArrayDevice::default();
        let cases = [
            ConvParams::new(3, 4, 3).with_groups(2),
            ConvParams::new(2, 2, 3).with_stride(0),
            ConvParams::new(2, 2, 0),
            ConvParams::new(2, 2, 3).with_dilation(0),
        ];
        for params in cases {
            assert!(matches!(
                Conv1d::<TestBackend>::new(params, &device),
                Err(Error::Config(_))
            ));
        }
        assert!(matches!(
            ConvTranspose1d::<TestBackend>::new(ConvParams::new(2, 2, 3).with_dilation(2), &device),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn from_weights_checks_shapes() {
        let device = NdArrayDevice::default();
        let weight = Tensor::<TestBackend, 3>::zeros([2, 1, 3], &device);
        let params = ConvParams::new(1, 2, 3).with_bias(false);
        let weights = ConvWeights::new(weight.clone(), None);
        let built = Conv1d::from_weights(params.clone(), weights.clone());
        assert!(built.is_ok());
        assert!(matches!(
            Conv1d::from_weights(params.clone().with_bias(true), weights),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConvTranspose1d::from_weights(params, ConvWeights::new(weight, None)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn random_init_respects_scale() {
        let device = NdArrayDevice::default();
        let layer = Conv1d::<TestBackend>::new(ConvParams::new(4, 2, 4), &device).expect("conv");
        let scale = (1.0f32 / 16.0).sqrt();
        let weights = to_vec(layer.weights().weight.clone());
        assert_eq!(weights.len(), 2 * 4 * 4);
        assert!(weights.iter().all(|w| w.abs() <= scale));
        let bias = layer.weights().bias.as_ref().expect("bias");
        assert_eq!(
            bias.to_data().to_vec::<f32>().expect("f32 data"),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn transposed_conv_overlaps_sum() {
        let device = NdArrayDevice::default();
        let weight = tensor3(vec![vec![vec![1.0, 1.0, 1.0]]], &device);
        let layer = ConvTranspose1d::from_weights(
            ConvParams::new(1, 1, 3).with_stride(2).with_bias(false),
            ConvWeights::new(weight, None),
        )
        .expect("conv transpose");
        let input = tensor3(vec![vec![vec![1.0, 2.0]]], &device);
        assert_eq!(
            to_vec(layer.forward(input).expect("forward")),
            vec![1.0, 1.0, 3.0, 2.0, 2.0]
        );
    }

    #[test]
    fn depthwise_transposed_conv_adds_bias() {
        let device = NdArrayDevice::default();
        let weight = tensor3(vec![vec![vec![1.0, 1.0]], vec![vec![2.0, 0.0]]], &device);
        let bias = Tensor::from_floats([10.0, 20.0], &device);
        let layer = ConvTranspose1d::from_weights(
            ConvParams::new(2, 2, 2).with_groups(2),
            ConvWeights::new(weight, Some(bias)),
        )
        .expect("conv transpose");
        let input = tensor3(vec![vec![vec![1.0, 1.0], vec![1.0, 3.0]]], &device);
        assert_eq!(
            to_vec(layer.forward(input).expect("forward")),
            vec![11.0, 12.0, 11.0, 22.0, 26.0, 20.0]
        );
    }
}
