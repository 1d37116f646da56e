pub mod attach;
pub mod events;
#[cfg(target_os = "linux")]
pub mod loader;
#[cfg(target_os = "linux")]
pub mod preflight;
pub mod ring;

use crate::Result;
use ring::RecordSource;
use std::path::PathBuf;

/// The three independently attachable instrumentation points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// `syscalls/sys_enter_write` tracepoint
    SyscallWrite,
    /// `tcp_sendmsg` kprobe
    KernelSend,
    /// uprobe on the target's write marker
    UserWrite,
}

impl ProbeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::SyscallWrite => "tracepoint/syscalls/sys_enter_write",
            ProbeKind::KernelSend => "kprobe/tcp_sendmsg",
            ProbeKind::UserWrite => "uprobe",
        }
    }

    /// Name of the program implementing this probe inside the eBPF object
    pub const fn program(&self) -> &'static str {
        match self {
            ProbeKind::SyscallWrite => "tp__sys_enter_write",
            ProbeKind::KernelSend => "kprobe__tcp_sendmsg",
            ProbeKind::UserWrite => "uprobe__AppWrite",
        }
    }

    /// A session without this probe has nothing to report
    pub const fn is_required(&self) -> bool {
        matches!(self, ProbeKind::SyscallWrite)
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a program gets attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachPoint {
    Tracepoint {
        category: &'static str,
        name: &'static str,
    },
    KProbe {
        function: &'static str,
    },
    UProbe {
        binary: PathBuf,
        symbol: String,
        pid: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub kind: ProbeKind,
    pub point: AttachPoint,
}

impl ProbeSpec {
    pub fn syscall_write() -> Self {
        Self {
            kind: ProbeKind::SyscallWrite,
            point: AttachPoint::Tracepoint {
                category: "syscalls",
                name: "sys_enter_write",
            },
        }
    }

    pub fn kernel_send() -> Self {
        Self {
            kind: ProbeKind::KernelSend,
            point: AttachPoint::KProbe {
                function: "tcp_sendmsg",
            },
        }
    }

    pub fn user_write(binary: PathBuf, symbol: impl Into<String>, pid: u32) -> Self {
        Self {
            kind: ProbeKind::UserWrite,
            point: AttachPoint::UProbe {
                binary,
                symbol: symbol.into(),
                pid: Some(pid),
            },
        }
    }
}

/// A live kernel link; detaching consumes it
pub trait ProbeLink {
    fn detach(self: Box<Self>) -> Result<()>;
}

/// A loaded eBPF object set
///
/// Loading happens when the backend is constructed. Dropping the backend
/// unloads every program and map it still owns.
pub trait ProbeBackend {
    /// Make sure the object's programs only report `pid`
    fn publish_target_pid(&mut self, pid: u32) -> Result<()>;

    fn attach(&mut self, spec: &ProbeSpec) -> Result<Box<dyn ProbeLink>>;

    /// Take the event ring buffer out of the object set
    fn open_ring_buffer(&mut self) -> Result<Box<dyn RecordSource>>;
}
