//! Shared test utilities for fixture loading and chunked streaming.

#![allow(dead_code)]

use burn::tensor::{Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use serde::Deserialize;
use streamconv::{StreamBuffer, StreamingModule};

pub type TestBackend = NdArray<f32>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Load and deserialize a JSON fixture file.
pub fn read_fixture<T: for<'de> Deserialize<'de>>(name: &str) -> T {
    let path = format!("{FIXTURE_DIR}/{name}");
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {path}: {e}"));
    serde_json::from_str(&data).unwrap_or_else(|e| panic!("failed to parse fixture {path}: {e}"))
}

/// Assert two tensor data slices are element-wise close within tolerance.
pub fn assert_close(a: &TensorData, b: &TensorData, tol: f32) {
    assert_eq!(a.shape, b.shape, "tensor shape mismatch");
    let a_slice = a.as_slice::<f32>().expect("a slice");
    let b_slice = b.as_slice::<f32>().expect("b slice");
    for (idx, (x, y)) in a_slice.iter().zip(b_slice.iter()).enumerate() {
        if (x - y).abs() > tol {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// Create a 1D tensor from a Vec.
pub fn tensor1(data: Vec<f32>, device: &NdArrayDevice) -> Tensor<TestBackend, 1> {
    let len = data.len();
    Tensor::from_data(TensorData::new(data, [len]), device)
}

/// Create a 3D tensor from nested Vecs.
pub fn tensor3(data: Vec<Vec<Vec<f32>>>, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
    let d0 = data.len();
    let d1 = data.first().map(|r| r.len()).unwrap_or(0);
    let d2 = data
        .first()
        .and_then(|r| r.first())
        .map(|r| r.len())
        .unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [d0, d1, d2]), device)
}

/// Feed `input` through `module` in chunks of the given lengths, then flush.
///
/// Returns the concatenated output.
pub fn stream_chunks<M: StreamingModule<TestBackend>>(
    module: &M,
    input: &Tensor<TestBackend, 3>,
    chunks: &[usize],
) -> StreamBuffer<TestBackend> {
    let mut state = module.init_state();
    let mut offset = 0;
    let mut out = StreamBuffer::empty();
    for &len in chunks {
        let chunk = (len > 0).then(|| input.clone().narrow(2, offset, len));
        let chunk = StreamBuffer::from_option(chunk);
        offset += len;
        let emitted = module.step(&mut state, chunk).expect("step");
        out = out.cat(emitted).expect("cat");
    }
    assert_eq!(offset, input.dims()[2], "chunks must cover the input");
    let tail = module.flush(&mut state).expect("flush");
    out.cat(tail).expect("cat")
}

/// Split `len` into chunk lengths using `cuts` as raw boundaries.
pub fn chunk_lengths(len: usize, cuts: &[usize]) -> Vec<usize> {
    let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (len + 1)).collect();
    bounds.push(0);
    bounds.push(len);
    bounds.sort_unstable();
    bounds.windows(2).map(|w| w[1] - w[0]).collect()
}
