#![allow(dead_code)]

use bytes::Bytes;
use iowatch::ebpf::ring::{ChannelSource, RecordSource};
use iowatch::ebpf::{ProbeBackend, ProbeKind, ProbeLink, ProbeSpec};
use iowatch::{Config, IowatchError, Result};
use iowatch_common::WriteEvent;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub const PID: i64 = 4242;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Publish(u32),
    Attach(ProbeKind),
    Detach(ProbeKind),
    OpenRing,
    Unload,
}

pub type OpLog = Arc<Mutex<Vec<Op>>>;

struct FakeLink {
    kind: ProbeKind,
    ops: OpLog,
}

impl ProbeLink for FakeLink {
    fn detach(self: Box<Self>) -> Result<()> {
        self.ops.lock().unwrap().push(Op::Detach(self.kind));
        Ok(())
    }
}

/// In-memory object set with a channel standing in for the ring buffer
pub struct FakeBackend {
    pub failing: HashSet<ProbeKind>,
    pub publish_fails: bool,
    pub ring_fails: bool,
    pub ops: OpLog,
    source: Option<ChannelSource>,
}

impl FakeBackend {
    pub fn new() -> (Self, mpsc::Sender<Bytes>) {
        let (tx, source) = ChannelSource::new(64);
        let backend = Self {
            failing: HashSet::new(),
            publish_fails: false,
            ring_fails: false,
            ops: OpLog::default(),
            source: Some(source),
        };
        (backend, tx)
    }

    pub fn failing(mut self, kind: ProbeKind) -> Self {
        self.failing.insert(kind);
        self
    }
}

impl ProbeBackend for FakeBackend {
    fn publish_target_pid(&mut self, pid: u32) -> Result<()> {
        if self.publish_fails {
            return Err(IowatchError::ConfigPublishFailed("target_pid global not found".into()));
        }
        self.ops.lock().unwrap().push(Op::Publish(pid));
        Ok(())
    }

    fn attach(&mut self, spec: &ProbeSpec) -> Result<Box<dyn ProbeLink>> {
        if self.failing.contains(&spec.kind) {
            return Err(IowatchError::AttachFailed {
                probe: spec.kind.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.ops.lock().unwrap().push(Op::Attach(spec.kind));
        Ok(Box::new(FakeLink {
            kind: spec.kind,
            ops: self.ops.clone(),
        }))
    }

    fn open_ring_buffer(&mut self) -> Result<Box<dyn RecordSource>> {
        if self.ring_fails {
            return Err(IowatchError::RingBuffer("events map not found".into()));
        }
        let source = self
            .source
            .take()
            .ok_or_else(|| IowatchError::RingBuffer("already opened".into()))?;
        self.ops.lock().unwrap().push(Op::OpenRing);
        Ok(Box::new(source))
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.ops.lock().unwrap().push(Op::Unload);
    }
}

/// Fake procfs where `PID` runs an absolute binary
pub fn proc_with_binary() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join(PID.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("cmdline"), b"/srv/app/bin/app\0-listen\0:8080\0").unwrap();
    root
}

/// Fake procfs without any process
pub fn empty_proc() -> TempDir {
    tempfile::tempdir().unwrap()
}

pub fn config(proc_root: &Path) -> Config {
    Config::new(PID)
        .with_listen("127.0.0.1:0".parse().unwrap())
        .with_proc_root(proc_root)
}

pub fn record(bytes: u64, tag: u32) -> Bytes {
    Bytes::copy_from_slice(&WriteEvent::new(PID as u32, bytes, tag).to_le_bytes())
}

pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future did not complete in time")
}

/// Minimal HTTP GET returning the response body
pub async fn scrape(addr: std::net::SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    response
}
