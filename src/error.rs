use thiserror::Error;

#[derive(Error, Debug)]
pub enum IowatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load eBPF program: {0}")]
    ProgramLoadFailed(String),

    #[error("Failed to attach {probe}: {reason}")]
    AttachFailed { probe: String, reason: String },

    #[error("Failed to detach probe: {0}")]
    DetachFailed(String),

    #[error("Program {0} not found in eBPF object")]
    ProgramNotFound(String),

    #[error("Map {0} not found in eBPF object")]
    MapNotFound(String),

    #[error("Failed to publish configuration: {0}")]
    ConfigPublishFailed(String),

    #[error("Ring buffer error: {0}")]
    RingBuffer(String),

    #[error("Ring buffer reader closed")]
    ReaderClosed,

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kernel version {version} is too old. Minimum required: {min_version}")]
    KernelVersionTooOld {
        version: String,
        min_version: String,
    },
}

impl From<prometheus::Error> for IowatchError {
    fn from(e: prometheus::Error) -> Self {
        IowatchError::Metrics(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IowatchError>;
