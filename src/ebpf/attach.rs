//! Probe attachment and release
//!
//! Each probe kind is attempted exactly once. Only the syscall tracepoint is
//! mandatory; the kprobe and uprobe degrade to a warning. Successful links are
//! kept in acquisition order and released in reverse.

use super::{ProbeBackend, ProbeKind, ProbeLink, ProbeSpec};
use crate::{IowatchError, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Released,
}

/// Owns one attached probe until it is released
pub struct AttachmentHandle {
    kind: ProbeKind,
    link: Option<Box<dyn ProbeLink>>,
}

impl AttachmentHandle {
    pub fn new(kind: ProbeKind, link: Box<dyn ProbeLink>) -> Self {
        Self {
            kind,
            link: Some(link),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn state(&self) -> HandleState {
        if self.link.is_some() {
            HandleState::Active
        } else {
            HandleState::Released
        }
    }

    /// Detach the probe. Calling this on a released handle does nothing.
    pub fn release(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        match link.detach() {
            Ok(()) => debug!(probe = %self.kind, "probe detached"),
            Err(e) => warn!(probe = %self.kind, error = %e, "failed to detach probe"),
        }
    }
}

impl Drop for AttachmentHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for AttachmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentHandle")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// Outcome of one probe, as seen after release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeStatus {
    pub kind: ProbeKind,
    /// `None` when the probe was never attached
    pub state: Option<HandleState>,
}

impl ProbeStatus {
    pub fn was_attached(&self) -> bool {
        self.state.is_some()
    }
}

struct Slot {
    kind: ProbeKind,
    handle: Option<AttachmentHandle>,
}

/// Attaches the session's probes and keeps them for LIFO release
#[derive(Default)]
pub struct AttachmentManager {
    slots: Vec<Slot>,
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentManager")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach all three probe kinds against `backend`
    ///
    /// `binary` is the resolved target executable; without it the uprobe is
    /// skipped. Fails only when the syscall tracepoint cannot be attached, in
    /// which case anything attached so far has already been released.
    pub fn attach_all<B>(
        backend: &mut B,
        pid: u32,
        binary: Option<PathBuf>,
        symbol: &str,
    ) -> Result<Self>
    where
        B: ProbeBackend + ?Sized,
    {
        let mut manager = Self::new();

        manager.attach(backend, &ProbeSpec::syscall_write())?;
        manager.attach(backend, &ProbeSpec::kernel_send())?;

        match binary {
            Some(binary) => {
                let spec = ProbeSpec::user_write(binary, symbol, pid);
                manager.attach(backend, &spec)?;
            }
            None => {
                warn!(
                    pid,
                    "could not resolve target binary path, skipping {}",
                    ProbeKind::UserWrite
                );
                manager.skip(ProbeKind::UserWrite);
            }
        }

        Ok(manager)
    }

    /// Attempt one probe; only a required probe turns failure into an error
    pub fn attach<B>(&mut self, backend: &mut B, spec: &ProbeSpec) -> Result<()>
    where
        B: ProbeBackend + ?Sized,
    {
        match backend.attach(spec) {
            Ok(link) => {
                info!(probe = %spec.kind, "probe attached");
                self.slots.push(Slot {
                    kind: spec.kind,
                    handle: Some(AttachmentHandle::new(spec.kind, link)),
                });
                Ok(())
            }
            Err(e) if spec.kind.is_required() => {
                self.release_all();
                Err(match e {
                    IowatchError::AttachFailed { .. } => e,
                    other => IowatchError::AttachFailed {
                        probe: spec.kind.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
            Err(e) => {
                warn!(probe = %spec.kind, error = %e, "probe not attached, continuing without it");
                self.skip(spec.kind);
                Ok(())
            }
        }
    }

    fn skip(&mut self, kind: ProbeKind) {
        self.slots.push(Slot { kind, handle: None });
    }

    pub fn is_attached(&self, kind: ProbeKind) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.kind == kind && slot.handle.is_some())
    }

    pub fn attached_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.handle.is_some()).count()
    }

    /// Release every handle, newest first
    pub fn release_all(&mut self) {
        for slot in self.slots.iter_mut().rev() {
            if let Some(handle) = slot.handle.as_mut() {
                handle.release();
            }
        }
    }

    /// Per-probe status in attachment order
    pub fn statuses(&self) -> Vec<ProbeStatus> {
        self.slots
            .iter()
            .map(|slot| ProbeStatus {
                kind: slot.kind,
                state: slot.handle.as_ref().map(AttachmentHandle::state),
            })
            .collect()
    }
}

impl Drop for AttachmentManager {
    fn drop(&mut self) {
        self.release_all();
    }
}
