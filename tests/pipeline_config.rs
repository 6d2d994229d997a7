mod common;

use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArrayDevice;
use common::{assert_close, stream_chunks, TestBackend};
use std::io::Write;
use streamconv::{load_config, Error, LayerConfig, Pipeline, StreamSession, StreamingModule};

const FIXTURE_CONFIG: &str = "tests/fixtures/encoder_decoder.yaml";

fn random_input(shape: [usize; 3], device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
    Tensor::random(shape, Distribution::Uniform(-1.0, 1.0), device)
}

#[test]
fn fixture_pipeline_streams_like_forward() {
    let config = load_config(FIXTURE_CONFIG).expect("load config");
    assert_eq!(config.layers.len(), 7);
    assert_eq!(config.in_channels(), Some(1));

    let device = NdArrayDevice::default();
    let pipeline = Pipeline::<TestBackend>::from_config(&config, &device).expect("pipeline");
    assert_eq!(pipeline.out_channels(), 1);

    let input = random_input([2, 1, 61], &device);
    let expected = pipeline.forward(input.clone()).expect("forward");
    // 61 -> 31 -> 11 -> 33 -> 66 samples.
    assert_eq!(expected.dims(), [2, 1, 66]);

    for chunks in [vec![61], vec![1; 61], vec![5, 13, 2, 30, 11]] {
        let streamed = stream_chunks(&pipeline, &input, &chunks)
            .into_option()
            .expect("streamed output");
        assert_close(&streamed.to_data(), &expected.to_data(), 1e-4);
    }
}

#[test]
fn sessions_share_one_pipeline() {
    let config = load_config(FIXTURE_CONFIG).expect("load config");
    let device = NdArrayDevice::default();
    let pipeline = Pipeline::<TestBackend>::from_config(&config, &device).expect("pipeline");
    let input = random_input([1, 1, 48], &device);
    let head = input.clone().narrow(2, 0, 24);
    let tail = input.narrow(2, 24, 24);

    let mut first = StreamSession::new(&pipeline);
    let mut second = StreamSession::new(&pipeline);
    let first_head = first.step(head.clone()).expect("step");
    // Another session stepping in between must not disturb the first.
    let other = random_input([1, 1, 17], &device);
    let _ = second.step(other).expect("step");
    let first_tail = first.step(tail.clone()).expect("step");

    let mut alone = StreamSession::new(&pipeline);
    let alone_head = alone.step(head).expect("step");
    let alone_tail = alone.step(tail).expect("step");

    for (shared, single) in [(first_head, alone_head), (first_tail, alone_tail)] {
        let shared = shared.into_option().expect("shared session output");
        let single = single.into_option().expect("single session output");
        assert_close(&shared.to_data(), &single.to_data(), 1e-6);
    }
}

const CONV_THEN_UPSAMPLE: &str = r#"
layers:
  - kind: conv
    in_channels: 2
    out_channels: 2
    kernel_size: 4
    stride: 2
  - kind: upsample
    dim: 2
    stride: 2
"#;

#[test]
fn yaml_round_trip_through_tempfile() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(CONV_THEN_UPSAMPLE.as_bytes())
        .expect("write config");

    let config = load_config(file.path()).expect("load config");
    let LayerConfig::Upsample(up) = &config.layers[1] else {
        panic!("expected an upsample layer");
    };
    assert_eq!(up.stride, 2);
    assert!(up.causal);
    let device = NdArrayDevice::default();
    let pipeline = Pipeline::<TestBackend>::from_config(&config, &device).expect("pipeline");
    let input = Tensor::<TestBackend, 3>::ones([1, 2, 8], &device);
    let output = pipeline.forward(input).expect("forward");
    assert_eq!(output.dims(), [1, 2, 8]);
}

#[test]
fn invalid_layers_are_reported() {
    let device = NdArrayDevice::default();
    let cases = [
        // groups do not divide channels
        r#"
layers:
  - kind: conv
    in_channels: 3
    out_channels: 4
    kernel_size: 3
    groups: 2
"#,
        // channel chain broken
        r#"
layers:
  - kind: conv
    in_channels: 1
    out_channels: 4
    kernel_size: 3
  - kind: downsample
    dim: 2
    stride: 2
"#,
        // transposed dilation
        r#"
layers:
  - kind: conv_transpose
    in_channels: 1
    out_channels: 1
    kernel_size: 3
    dilation: 2
"#,
    ];
    for yaml in cases {
        let config = streamconv::PipelineConfig::from_yaml(yaml).expect("parse");
        let err = Pipeline::<TestBackend>::from_config(&config, &device).expect_err("invalid");
        assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
    }
}

#[test]
fn centered_pipeline_runs_forward_but_not_step() {
    let config = streamconv::PipelineConfig::from_yaml(
        r#"
layers:
  - kind: conv
    in_channels: 1
    out_channels: 1
    kernel_size: 3
    causal: false
"#,
    )
    .expect("parse");
    let device = NdArrayDevice::default();
    let pipeline = Pipeline::<TestBackend>::from_config(&config, &device).expect("pipeline");
    let input = Tensor::<TestBackend, 3>::ones([1, 1, 6], &device);
    let output = pipeline.forward(input.clone()).expect("forward");
    assert_eq!(output.dims(), [1, 1, 6]);

    let mut state = pipeline.init_state();
    assert!(matches!(
        pipeline.step(&mut state, input.into()),
        Err(Error::Config(_))
    ));
}
