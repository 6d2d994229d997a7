//! Convolution building blocks for streaming inference.
//!
//! Dense operators and padding helpers sit at the bottom; the streamable
//! layers wrap them with carry-over state, and [`pipeline`] chains them.

pub mod conv;
pub mod padding;
pub mod pipeline;
pub mod resample;
pub mod streaming_conv;
