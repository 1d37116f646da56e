//! Ring buffer reading with an out-of-band close
//!
//! The consumption loop owns a [`RingReader`] and blocks in [`RingReader::read`].
//! The session keeps the matching [`ReaderHandle`]; closing it makes the
//! blocked read (and every later one) fail with [`IowatchError::ReaderClosed`].

use crate::{IowatchError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Anything that yields raw event records
#[async_trait]
pub trait RecordSource: Send {
    /// Wait for the next record
    async fn next_record(&mut self) -> Result<Bytes>;
}

/// Record source fed from an in-process channel, for running the pipeline
/// without a kernel ring buffer
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn next_record(&mut self) -> Result<Bytes> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| IowatchError::RingBuffer("record channel closed".into()))
    }
}

pub struct RingReader {
    source: Box<dyn RecordSource>,
    closed: CancellationToken,
}

/// Close capability for a [`RingReader`], held by the session
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    closed: CancellationToken,
}

impl RingReader {
    pub fn new(source: Box<dyn RecordSource>) -> (Self, ReaderHandle) {
        let closed = CancellationToken::new();
        let handle = ReaderHandle {
            closed: closed.clone(),
        };
        (Self { source, closed }, handle)
    }

    pub async fn read(&mut self) -> Result<Bytes> {
        if self.closed.is_cancelled() {
            return Err(IowatchError::ReaderClosed);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(IowatchError::ReaderClosed),
            record = self.source.next_record() => record,
        }
    }
}

impl ReaderHandle {
    /// Close the reader; idempotent
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
