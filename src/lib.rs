pub mod activity;
pub mod cli;
pub mod config;
#[cfg(target_os = "linux")]
pub mod ebpf;
pub mod error;
pub mod metrics;
pub mod table;

pub use error::{PortwatchError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
