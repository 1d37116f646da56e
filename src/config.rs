use crate::{IowatchError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 9100;
pub const DEFAULT_LISTEN: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT);
pub const DEFAULT_OBJECT_PATH: &str = "/usr/lib/iowatch/trace_write.bpf.o";
pub const DEFAULT_UPROBE_SYMBOL: &str = "AppWrite";
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Startup parameters for one observer session
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw target pid as given by the operator; checked by [`Config::validate`]
    pub pid: i64,
    pub listen: SocketAddr,
    pub object_path: PathBuf,
    pub uprobe_symbol: String,
    pub proc_root: PathBuf,
}

impl Config {
    pub fn new(pid: i64) -> Self {
        Self {
            pid,
            listen: DEFAULT_LISTEN,
            object_path: PathBuf::from(DEFAULT_OBJECT_PATH),
            uprobe_symbol: DEFAULT_UPROBE_SYMBOL.to_string(),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        }
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Returns the target pid once it is known to be a positive `u32`
    pub fn validate(&self) -> Result<u32> {
        if self.pid <= 0 {
            return Err(IowatchError::Config(format!(
                "target pid must be a positive integer, got {}",
                self.pid
            )));
        }

        u32::try_from(self.pid).map_err(|_| {
            IowatchError::Config(format!("target pid {} is out of range", self.pid))
        })
    }
}
