//! Padding policy and frame arithmetic for 1D convolutions.
//!
//! Full-sequence convolutions are padded so that the output length depends
//! only on the stride and kernel size, and transposed convolutions are trimmed
//! back down afterwards. Streaming layers reuse the same arithmetic to decide
//! how many frames a chunk completes.

use crate::error::{Error, Result};
use burn::tensor::backend::Backend;
use burn::tensor::ops::PadMode;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Padding modes supported by streamable convolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    /// Pad with zeros.
    #[default]
    #[serde(alias = "zero")]
    Constant,
    /// Replicate edge values.
    #[serde(alias = "edge")]
    Replicate,
}

impl PaddingMode {
    fn pad_mode(self) -> PadMode {
        match self {
            PaddingMode::Constant => PadMode::Constant(0.0),
            PaddingMode::Replicate => PadMode::Edge,
        }
    }
}

/// Receptive width of a kernel once dilation is applied.
pub fn effective_kernel_size(kernel_size: usize, dilation: usize) -> usize {
    kernel_size.saturating_sub(1) * dilation + 1
}

/// Extra right padding needed for the last frame of a convolution to be whole.
///
/// Returns the smallest non-negative `extra` such that
/// `len + padding_total + extra - kernel_size` is a non-negative multiple of
/// `stride`.
pub fn extra_padding_for_conv1d(
    len: usize,
    kernel_size: usize,
    stride: usize,
    padding_total: usize,
) -> usize {
    let span = (len + padding_total).saturating_sub(kernel_size);
    let n_frames = span.div_ceil(stride) + 1;
    let ideal_len = (n_frames - 1) * stride + kernel_size;
    ideal_len.saturating_sub(len + padding_total)
}

/// Left/right padding applied by a full-sequence convolution of `len` samples.
pub fn conv_padding(
    len: usize,
    effective_kernel: usize,
    stride: usize,
    causal: bool,
) -> (usize, usize) {
    let padding_total = effective_kernel.saturating_sub(stride);
    let extra = extra_padding_for_conv1d(len, effective_kernel, stride, padding_total);
    if causal {
        (padding_total, extra)
    } else {
        let right = padding_total / 2;
        (padding_total - right, right + extra)
    }
}

/// Left/right trim applied after a full-sequence transposed convolution.
pub fn conv_transpose_unpadding(kernel_size: usize, stride: usize, causal: bool) -> (usize, usize) {
    let padding_total = kernel_size.saturating_sub(stride);
    if causal {
        (0, padding_total)
    } else {
        let right = padding_total / 2;
        (padding_total - right, right)
    }
}

/// Output length of a 1D convolution, or 0 when the input is too short.
pub fn conv_output_len(
    input_len: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
    padding: usize,
) -> usize {
    let kernel_extent = effective_kernel_size(kernel_size, dilation);
    let padded = input_len + 2 * padding;
    if input_len == 0 || padded < kernel_extent {
        return 0;
    }
    (padded - kernel_extent) / stride + 1
}

/// Output length of a 1D transposed convolution, or 0 for empty input.
pub fn conv_transpose_output_len(
    input_len: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> usize {
    if input_len == 0 {
        return 0;
    }
    ((input_len - 1) * stride + kernel_size).saturating_sub(2 * padding)
}

/// Pad the time axis with zeros or replicated edge samples.
pub fn pad1d<B: Backend>(
    input: Tensor<B, 3>,
    left: usize,
    right: usize,
    mode: PaddingMode,
) -> Result<Tensor<B, 3>> {
    if left == 0 && right == 0 {
        return Ok(input);
    }
    if input.dims()[2] == 0 {
        return Err(Error::shape("cannot pad an empty sequence"));
    }
    Ok(input.pad((left, right, 0, 0), mode.pad_mode()))
}

/// Remove `left` samples from the start and `right` from the end of the time axis.
///
/// Trimming the whole sequence yields a zero-length time axis.
pub fn unpad1d<B: Backend>(input: Tensor<B, 3>, left: usize, right: usize) -> Result<Tensor<B, 3>> {
    let [batch, channels, len] = input.dims();
    if left + right > len {
        return Err(Error::shape(format!(
            "cannot trim {left}+{right} samples from a sequence of length {len}"
        )));
    }
    if left == 0 && right == 0 {
        return Ok(input);
    }
    if left + right == len {
        // `narrow` rejects zero lengths.
        return Ok(Tensor::zeros([batch, channels, 0], &input.device()));
    }
    Ok(input.narrow(2, left, len - left - right))
}
