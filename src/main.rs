//! Command-line interface for streaming convolution pipelines.
//!
//! `check` verifies that chunked streaming reproduces full-sequence output for
//! a pipeline described in YAML; `frames` prints the padding and frame
//! arithmetic for a single convolution.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use streamconv::config::load_config;
use streamconv::modules::padding::{
    conv_output_len, conv_padding, effective_kernel_size, extra_padding_for_conv1d,
};
use streamconv::perf;
use streamconv::{Pipeline, StreamBuffer, StreamingModule};
use tracing_subscriber::EnvFilter;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "streamconv")]
#[command(about = "Streaming 1D convolution toolkit", long_about = None)]
struct Cli {
    /// Print performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compare chunked streaming against full-sequence evaluation.
    Check {
        /// Pipeline YAML file.
        #[arg(long)]
        config: PathBuf,
        /// Input length in samples.
        #[arg(long, default_value_t = 4800)]
        length: usize,
        /// Chunk size in samples.
        #[arg(long, default_value_t = 480)]
        chunk: usize,
        /// Batch size.
        #[arg(long, default_value_t = 1)]
        batch: usize,
        /// Maximum allowed absolute difference.
        #[arg(long, default_value_t = 1e-4)]
        tolerance: f32,
    },
    /// Print padding and frame counts for one convolution.
    Frames {
        /// Input length in samples.
        #[arg(long)]
        length: usize,
        /// Kernel size in samples.
        #[arg(long)]
        kernel_size: usize,
        /// Stride in samples.
        #[arg(long)]
        stride: usize,
        /// Dilation factor.
        #[arg(long, default_value_t = 1)]
        dilation: usize,
        /// Use centered instead of causal padding.
        #[arg(long)]
        centered: bool,
    },
}

/// Arguments for the `check` subcommand.
struct CheckArgs {
    config: PathBuf,
    length: usize,
    chunk: usize,
    batch: usize,
    tolerance: f32,
}

/// Entry point for the CLI.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Check {
            config,
            length,
            chunk,
            batch,
            tolerance,
        } => {
            let args = CheckArgs {
                config,
                length,
                chunk,
                batch,
                tolerance,
            };
            let device = NdArrayDevice::default();
            run_check::<NdArray<f32>>(args, &device)?;
        }
        Commands::Frames {
            length,
            kernel_size,
            stride,
            dilation,
            centered,
        } => {
            run_frames(length, kernel_size, stride, dilation, centered)?;
        }
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

fn run_check<B: Backend>(args: CheckArgs, device: &B::Device) -> Result<()> {
    if args.length == 0 || args.chunk == 0 || args.batch == 0 {
        anyhow::bail!("--length, --chunk and --batch must all be at least 1");
    }
    let config = load_config(&args.config)?;
    let pipeline = Pipeline::<B>::from_config(&config, device)
        .with_context(|| {
            format!("Failed to build pipeline from {}", args.config.display())
        })?;

    let input = Tensor::<B, 3>::random(
        [args.batch, pipeline.in_channels(), args.length],
        Distribution::Uniform(-1.0, 1.0),
        device,
    );
    let expected = pipeline.forward(input.clone())?;

    let mut state = pipeline.init_state();
    let mut streamed = StreamBuffer::empty();
    let mut offset = 0;
    while offset < args.length {
        let len = args.chunk.min(args.length - offset);
        let chunk = input.clone().narrow(2, offset, len);
        offset += len;
        streamed = streamed.cat(pipeline.step(&mut state, chunk.into())?)?;
    }
    streamed = streamed.cat(pipeline.flush(&mut state)?)?;

    let expected_len = expected.dims()[2];
    println!("layers:   {}", pipeline.layers().len());
    println!("forward:  {:?}", expected.dims());
    let Some(streamed) = streamed.into_option() else {
        anyhow::bail!(
            "Streaming produced no output (forward produced {expected_len} samples)"
        );
    };
    println!("streamed: {:?}", streamed.dims());
    if streamed.dims() != expected.dims() {
        anyhow::bail!(
            "Shape mismatch: streamed {:?} vs forward {:?}",
            streamed.dims(),
            expected.dims()
        );
    }

    let max_diff = max_abs_diff(streamed, expected)?;
    println!("max abs diff: {max_diff:.3e}");
    if max_diff > args.tolerance {
        anyhow::bail!(
            "Streaming diverges from forward: {max_diff:.3e} > tolerance {:.3e}",
            args.tolerance
        );
    }
    Ok(())
}

fn max_abs_diff<B: Backend>(lhs: Tensor<B, 3>, rhs: Tensor<B, 3>) -> Result<f32> {
    let diff = (lhs - rhs)
        .abs()
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| anyhow::anyhow!("Failed to read tensor data: {err:?}"))?;
    Ok(diff.into_iter().fold(0.0, f32::max))
}

fn run_frames(
    length: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
    centered: bool,
) -> Result<()> {
    if length == 0 || kernel_size == 0 || stride == 0 || dilation == 0 {
        anyhow::bail!(
            "--length, --kernel-size, --stride and --dilation must all be at least 1"
        );
    }
    let kernel = effective_kernel_size(kernel_size, dilation);
    let padding_total = kernel.saturating_sub(stride);
    let extra = extra_padding_for_conv1d(length, kernel, stride, padding_total);
    let (left, right) = conv_padding(length, kernel, stride, !centered);
    let frames = conv_output_len(length + left + right, kernel, stride, 1, 0);

    println!("effective kernel: {kernel}");
    println!("padding total:    {padding_total}");
    println!("extra padding:    {extra}");
    println!("padding:          left={left} right={right}");
    println!("output frames:    {frames}");
    if !centered && kernel >= stride {
        // Frames completed by step alone; the rest comes from flush.
        let streamed = (padding_total + length + stride).saturating_sub(kernel) / stride;
        println!(
            "streamed frames:  {streamed} (+{} on flush)",
            frames.saturating_sub(streamed)
        );
    }
    Ok(())
}
