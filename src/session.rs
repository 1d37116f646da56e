//! Session lifecycle
//!
//! [`Session::start`] acquires everything in order: object set, probes, ring
//! buffer reader, then starts the exporter and the consumption loop.
//! [`Session::shutdown`] gives it all back in reverse. A session that lost
//! its kprobe or uprobe is degraded but keeps running.

use crate::config::Config;
use crate::consumer::{self, LoopExit, LoopStats};
use crate::ebpf::attach::{AttachmentManager, HandleState, ProbeStatus};
use crate::ebpf::ring::{ReaderHandle, RingReader};
use crate::ebpf::{ProbeBackend, ProbeKind};
use crate::metrics::{Aggregator, PrometheusExporter};
use crate::target::TargetResolver;
use crate::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Session<B: ProbeBackend> {
    pid: u32,
    reader: ReaderHandle,
    consumer: Option<JoinHandle<(LoopExit, LoopStats)>>,
    exporter_shutdown: CancellationToken,
    exporter: Option<JoinHandle<()>>,
    metrics_addr: SocketAddr,
    aggregator: Arc<Aggregator>,
    // Field order doubles as drop order: probes detach before the object unloads
    attachments: AttachmentManager,
    backend: Option<B>,
}

/// What was held by a session and how it was given back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub probes: Vec<ProbeStatus>,
    /// `None` if the consumption task panicked
    pub loop_exit: Option<LoopExit>,
    pub loop_stats: LoopStats,
}

impl ShutdownReport {
    pub fn all_released(&self) -> bool {
        self.probes
            .iter()
            .all(|probe| probe.state != Some(HandleState::Active))
    }
}

impl<B: ProbeBackend> Session<B> {
    /// Bring a session up
    ///
    /// `load` builds the object set for the validated pid and is only called
    /// once the configuration is valid. Fails on an invalid pid, a failed load, a failed syscall
    /// tracepoint, an unopenable ring buffer or an unbindable listen address;
    /// anything acquired before the failure is released on the way out.
    pub async fn start<F>(config: &Config, load: F) -> Result<Self>
    where
        F: FnOnce(&Config, u32) -> Result<B>,
    {
        let pid = config.validate()?;
        let aggregator = Arc::new(Aggregator::new()?);

        let mut backend = load(config, pid)?;

        if let Err(e) = backend.publish_target_pid(pid) {
            warn!(pid, error = %e, "target pid not published, probes will not filter by pid");
        }

        let binary = TargetResolver::new(&config.proc_root).resolve(pid);
        if let Some(path) = &binary {
            info!(pid, "resolved target binary {}", path.display());
        }

        let attachments =
            AttachmentManager::attach_all(&mut backend, pid, binary, &config.uprobe_symbol)?;

        let (reader, reader_handle) = RingReader::new(backend.open_ring_buffer()?);

        let exporter = PrometheusExporter::bind(config.listen, aggregator.clone()).await?;
        let metrics_addr = exporter.local_addr()?;
        let exporter_shutdown = CancellationToken::new();
        let exporter = exporter.spawn(exporter_shutdown.clone());

        let consumer = consumer::spawn(reader, aggregator.clone());

        info!(pid, probes = attachments.attached_count(), "session running");

        Ok(Self {
            pid,
            reader: reader_handle,
            consumer: Some(consumer),
            exporter_shutdown,
            exporter: Some(exporter),
            metrics_addr,
            aggregator,
            attachments,
            backend: Some(backend),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn is_attached(&self, kind: ProbeKind) -> bool {
        self.attachments.is_attached(kind)
    }

    /// Whether the consumption loop has stopped on its own
    pub fn consumer_finished(&self) -> bool {
        self.consumer.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Run until `shutdown` resolves, then release everything
    pub async fn run_until<S>(self, shutdown: S) -> ShutdownReport
    where
        S: Future<Output = ()>,
    {
        shutdown.await;
        info!("shutdown requested");
        self.shutdown().await
    }

    /// Close the reader, stop both tasks, detach probes and unload the object
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.reader.close();
        let (loop_exit, loop_stats) = match self.consumer.take() {
            Some(task) => match task.await {
                Ok((exit, stats)) => (Some(exit), stats),
                Err(e) => {
                    warn!(error = %e, "consumption task failed");
                    (None, LoopStats::default())
                }
            },
            None => (None, LoopStats::default()),
        };

        self.exporter_shutdown.cancel();
        if let Some(task) = self.exporter.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "metrics server task failed");
            }
        }

        self.attachments.release_all();
        let probes = self.attachments.statuses();

        drop(self.backend.take());
        info!(
            records = loop_stats.records,
            discarded = loop_stats.discarded,
            "session released"
        );

        ShutdownReport {
            probes,
            loop_exit,
            loop_stats,
        }
    }
}

impl<B: ProbeBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.reader.close();
        self.exporter_shutdown.cancel();
        self.attachments.release_all();
    }
}
