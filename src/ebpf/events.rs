use iowatch_common::{kind, BYTES_OFFSET, KIND_OFFSET, MIN_RECORD_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SyscallWrite,
    KernelSend,
    UserProbeWrite,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::SyscallWrite,
        EventKind::KernelSend,
        EventKind::UserProbeWrite,
    ];

    /// Map a wire tag to a kind; unknown tags come from newer producers
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            kind::SYSCALL_WRITE => Some(EventKind::SyscallWrite),
            kind::KERNEL_SEND => Some(EventKind::KernelSend),
            kind::USER_PROBE_WRITE => Some(EventKind::UserProbeWrite),
            _ => None,
        }
    }

    pub const fn tag(&self) -> u32 {
        match self {
            EventKind::SyscallWrite => kind::SYSCALL_WRITE,
            EventKind::KernelSend => kind::KERNEL_SEND,
            EventKind::UserProbeWrite => kind::USER_PROBE_WRITE,
        }
    }

    pub const fn index(&self) -> usize {
        match self {
            EventKind::SyscallWrite => 0,
            EventKind::KernelSend => 1,
            EventKind::UserProbeWrite => 2,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::SyscallWrite => write!(f, "syscall_write"),
            EventKind::KernelSend => write!(f, "kernel_send"),
            EventKind::UserProbeWrite => write!(f, "user_probe_write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    pub kind: EventKind,
    pub bytes: u64,
}

/// Decode one ring buffer record
///
/// Short records and unknown tags yield `None`. Both are expected on this
/// transport and are dropped without logging.
pub fn decode(record: &[u8]) -> Option<DecodedEvent> {
    if record.len() < MIN_RECORD_LEN {
        return None;
    }

    let bytes = u64::from_le_bytes(record[BYTES_OFFSET..BYTES_OFFSET + 8].try_into().ok()?);
    let tag = u32::from_le_bytes(record[KIND_OFFSET..KIND_OFFSET + 4].try_into().ok()?);

    Some(DecodedEvent {
        kind: EventKind::from_tag(tag)?,
        bytes,
    })
}
