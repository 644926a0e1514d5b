//! Tracing setup shared by the Downdetector binaries

mod subscriber;

pub use subscriber::{LogFormat, init_tracing, init_tracing_with};
