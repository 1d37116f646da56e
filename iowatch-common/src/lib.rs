//! Wire contract between the kernel object and the userspace observer
//!
//! The kernel programs reserve one `WriteEvent` per observed call and submit
//! it to the `events` ring buffer. Userspace only depends on the byte offsets
//! defined here, never on the struct itself, so records may grow at the tail.
//!
//! All multi-byte fields are little-endian (the object is built for `bpfel`).

#![cfg_attr(not(feature = "userspace"), no_std)]

use core::mem::{offset_of, size_of};

/// Ring buffer record as written by the kernel programs
///
/// Layout (24 bytes total, 8-byte aligned):
/// - pid: Thread group id of the caller
/// - bytes: Byte count argument of the observed call
/// - kind: Event kind tag, see [`kind`]
#[repr(C)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct WriteEvent {
    pub pid: u32,
    pub _padding0: u32,
    pub bytes: u64,
    pub kind: u32,
    pub _padding1: u32,
}

/// Event kind tags carried in [`WriteEvent::kind`]
pub mod kind {
    /// `sys_enter_write` tracepoint
    pub const SYSCALL_WRITE: u32 = 1;
    /// `tcp_sendmsg` kprobe
    pub const KERNEL_SEND: u32 = 2;
    /// uprobe on the target's write marker function
    pub const USER_PROBE_WRITE: u32 = 3;
}

/// Offset of the little-endian `u64` byte count
pub const BYTES_OFFSET: usize = offset_of!(WriteEvent, bytes);

/// Offset of the little-endian `u32` kind tag
pub const KIND_OFFSET: usize = offset_of!(WriteEvent, kind);

/// Shortest record userspace will decode
pub const MIN_RECORD_LEN: usize = KIND_OFFSET + size_of::<u32>();

/// Name of the ring buffer map in the kernel object
pub const EVENTS_MAP: &str = "events";

/// Read-only `u32` global the kernel programs compare the caller's tgid
/// against; zero disables the filter
pub const TARGET_PID_GLOBAL: &str = "target_pid";

const _: () = {
    assert!(BYTES_OFFSET == 8, "bytes must live at offset 8");
    assert!(KIND_OFFSET == 16, "kind must live at offset 16");
    assert!(MIN_RECORD_LEN == 20, "records shorter than 20 bytes are invalid");
    assert!(
        size_of::<WriteEvent>() == 24,
        "WriteEvent must be exactly 24 bytes"
    );
    assert!(
        core::mem::align_of::<WriteEvent>() == 8,
        "WriteEvent must be 8-byte aligned"
    );
};

#[cfg(feature = "userspace")]
impl WriteEvent {
    pub fn new(pid: u32, bytes: u64, kind: u32) -> Self {
        Self {
            pid,
            _padding0: 0,
            bytes,
            kind,
            _padding1: 0,
        }
    }

    /// Serialize the record exactly as the kernel program lays it out
    pub fn to_le_bytes(&self) -> [u8; size_of::<WriteEvent>()] {
        let mut out = [0u8; size_of::<WriteEvent>()];
        out[0..4].copy_from_slice(&self.pid.to_le_bytes());
        out[BYTES_OFFSET..BYTES_OFFSET + 8].copy_from_slice(&self.bytes.to_le_bytes());
        out[KIND_OFFSET..KIND_OFFSET + 4].copy_from_slice(&self.kind.to_le_bytes());
        out
    }
}
