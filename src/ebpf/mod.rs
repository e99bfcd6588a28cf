//! XDP program lifecycle and kernel map access (Linux only)

pub mod loader;
pub mod maps;

pub use loader::{run_preflight_checks, ProbeManager};
pub use maps::KernelCounters;
