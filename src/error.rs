use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortwatchError {
    #[error("Failed to load eBPF program: {0}")]
    ProgramLoadFailed(String),

    #[error("Failed to attach XDP program to {interface}: {reason}")]
    AttachFailed { interface: String, reason: String },

    #[error("eBPF map error: {0}")]
    MapError(String),

    #[error("XDP probe was not built into this binary. Install bpf-linker and rebuild")]
    ProbeNotBuilt,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Kernel version {version} is too old. Minimum required: {min_version}")]
    KernelVersionTooOld {
        version: String,
        min_version: String,
    },

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported feature on this system: {0}")]
    UnsupportedFeature(String),
}

impl From<prometheus::Error> for PortwatchError {
    fn from(err: prometheus::Error) -> Self {
        PortwatchError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PortwatchError>;
