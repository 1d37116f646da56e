pub mod cli;
pub mod config;
pub mod consumer;
pub mod ebpf;
pub mod error;
pub mod metrics;
pub mod session;
pub mod target;

pub use config::Config;
pub use error::{IowatchError, Result};
pub use session::{Session, ShutdownReport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
