//! aya-backed eBPF object set

use super::preflight::run_preflight_checks;
use super::ring::RecordSource;
use super::{AttachPoint, ProbeBackend, ProbeLink, ProbeSpec};
use crate::{IowatchError, Result};
use async_trait::async_trait;
use aya::maps::{MapData, RingBuf};
use aya::programs::links::Link;
use aya::programs::{KProbe, TracePoint, UProbe};
use aya::{Ebpf, EbpfError, EbpfLoader};
use aya_log::EbpfLogger;
use bytes::Bytes;
use iowatch_common::{EVENTS_MAP, TARGET_PID_GLOBAL};
use std::path::Path;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info};

/// Loaded eBPF object set; dropping it unloads every program and map
pub struct AyaBackend {
    bpf: Ebpf,
    /// Pid patched into the object's `target_pid` global, if it has one
    pid_filter: Option<u32>,
}

impl AyaBackend {
    /// Run pre-flight checks and load the compiled object at `path`
    ///
    /// `pid` is written into the read-only `target_pid` global before the
    /// object reaches the kernel. An object without that global still loads,
    /// unfiltered.
    pub fn load(path: &Path, pid: u32) -> Result<Self> {
        run_preflight_checks()?;

        if !path.exists() {
            return Err(IowatchError::ProgramLoadFailed(format!(
                "object file not found: {}",
                path.display()
            )));
        }

        info!("Loading eBPF object {}", path.display());
        let data = std::fs::read(path)?;

        let (mut bpf, pid_filter) = match load_with_target_pid(&data, pid, true) {
            Ok(bpf) => (bpf, Some(pid)),
            Err(e) => {
                debug!(error = %e, "no {} global, loading unfiltered", TARGET_PID_GLOBAL);
                let bpf = load_with_target_pid(&data, pid, false).map_err(|e| {
                    IowatchError::ProgramLoadFailed(format!("{}: {}", path.display(), e))
                })?;
                (bpf, None)
            }
        };

        if let Err(e) = EbpfLogger::init(&mut bpf) {
            debug!(error = %e, "eBPF logger unavailable, probe-side logs will not be forwarded");
        }

        Ok(Self { bpf, pid_filter })
    }

    fn program_mut(&mut self, name: &str) -> Result<&mut aya::programs::Program> {
        self.bpf
            .program_mut(name)
            .ok_or_else(|| IowatchError::ProgramNotFound(name.to_string()))
    }
}

fn load_with_target_pid(
    data: &[u8],
    pid: u32,
    must_exist: bool,
) -> std::result::Result<Ebpf, EbpfError> {
    let mut loader = EbpfLoader::new();
    loader.set_global(TARGET_PID_GLOBAL, &pid, must_exist);
    loader.load(data)
}

/// Whether the object loaded with `pid_filter` filters on `pid`
fn check_pid_filter(pid_filter: Option<u32>, pid: u32) -> Result<()> {
    match pid_filter {
        Some(loaded) if loaded == pid => Ok(()),
        Some(loaded) => Err(IowatchError::ConfigPublishFailed(format!(
            "object was loaded for pid {}, not {}",
            loaded, pid
        ))),
        None => Err(IowatchError::ConfigPublishFailed(format!(
            "{} global not found in eBPF object",
            TARGET_PID_GLOBAL
        ))),
    }
}

fn attach_error(spec: &ProbeSpec, e: impl std::fmt::Display) -> IowatchError {
    IowatchError::AttachFailed {
        probe: spec.kind.to_string(),
        reason: e.to_string(),
    }
}

impl ProbeBackend for AyaBackend {
    fn publish_target_pid(&mut self, pid: u32) -> Result<()> {
        check_pid_filter(self.pid_filter, pid)?;
        debug!(pid, "probes filter on {}", TARGET_PID_GLOBAL);
        Ok(())
    }

    fn attach(&mut self, spec: &ProbeSpec) -> Result<Box<dyn ProbeLink>> {
        let name = spec.kind.program();
        let program = self.program_mut(name)?;

        match &spec.point {
            AttachPoint::Tracepoint { category, name } => {
                let program: &mut TracePoint =
                    program.try_into().map_err(|e| attach_error(spec, e))?;
                program.load().map_err(|e| attach_error(spec, e))?;
                let id = program
                    .attach(category, name)
                    .map_err(|e| attach_error(spec, e))?;
                let link = program.take_link(id).map_err(|e| attach_error(spec, e))?;
                Ok(Box::new(AyaLink(link)))
            }
            AttachPoint::KProbe { function } => {
                let program: &mut KProbe = program.try_into().map_err(|e| attach_error(spec, e))?;
                program.load().map_err(|e| attach_error(spec, e))?;
                let id = program
                    .attach(function, 0)
                    .map_err(|e| attach_error(spec, e))?;
                let link = program.take_link(id).map_err(|e| attach_error(spec, e))?;
                Ok(Box::new(AyaLink(link)))
            }
            AttachPoint::UProbe {
                binary,
                symbol,
                pid,
            } => {
                let pid = pid
                    .map(i32::try_from)
                    .transpose()
                    .map_err(|e| attach_error(spec, e))?;
                let program: &mut UProbe = program.try_into().map_err(|e| attach_error(spec, e))?;
                program.load().map_err(|e| attach_error(spec, e))?;
                let id = program
                    .attach(Some(symbol.as_str()), 0, binary, pid)
                    .map_err(|e| attach_error(spec, e))?;
                let link = program.take_link(id).map_err(|e| attach_error(spec, e))?;
                Ok(Box::new(AyaLink(link)))
            }
        }
    }

    fn open_ring_buffer(&mut self) -> Result<Box<dyn RecordSource>> {
        let available_maps: Vec<_> = self.bpf.maps().map(|(name, _)| name.to_string()).collect();
        let map = self.bpf.take_map(EVENTS_MAP).ok_or_else(|| {
            IowatchError::RingBuffer(format!(
                "{} map not found in eBPF object. Available maps: {:?}",
                EVENTS_MAP, available_maps
            ))
        })?;

        let ring = RingBuf::try_from(map).map_err(|e| IowatchError::RingBuffer(e.to_string()))?;
        let fd = AsyncFd::new(ring)?;

        Ok(Box::new(AyaRingSource { fd }))
    }
}

struct AyaLink<L>(L);

impl<L> ProbeLink for AyaLink<L>
where
    L: Link,
{
    fn detach(self: Box<Self>) -> Result<()> {
        self.0
            .detach()
            .map_err(|e| IowatchError::DetachFailed(e.to_string()))
    }
}

struct AyaRingSource {
    fd: AsyncFd<RingBuf<MapData>>,
}

#[async_trait]
impl RecordSource for AyaRingSource {
    async fn next_record(&mut self) -> Result<Bytes> {
        loop {
            let mut guard = self.fd.readable_mut().await?;

            if let Some(item) = guard.get_inner_mut().next() {
                return Ok(Bytes::copy_from_slice(&item));
            }

            guard.clear_ready();
        }
    }
}
