//! Ring buffer consumption loop
//!
//! Reads records one at a time, decodes them and feeds the aggregator. The
//! loop has no shutdown input of its own: it stops when a read fails, which
//! is how it notices the session closing its reader.

use crate::ebpf::events::decode;
use crate::ebpf::ring::RingReader;
use crate::metrics::Aggregator;
use crate::IowatchError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The reader was closed by the session
    ReaderClosed,
    /// The ring buffer failed underneath the reader
    ReadError(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub records: u64,
    pub discarded: u64,
}

pub async fn run(mut reader: RingReader, aggregator: Arc<Aggregator>) -> (LoopExit, LoopStats) {
    let mut stats = LoopStats::default();

    loop {
        let record = match reader.read().await {
            Ok(record) => record,
            Err(IowatchError::ReaderClosed) => {
                info!(
                    records = stats.records,
                    discarded = stats.discarded,
                    "ring buffer reader closed, consumption loop stopped"
                );
                return (LoopExit::ReaderClosed, stats);
            }
            Err(e) => {
                warn!(error = %e, "ring buffer read failed, consumption loop stopped");
                return (LoopExit::ReadError(e.to_string()), stats);
            }
        };

        stats.records += 1;
        match decode(&record) {
            Some(event) => aggregator.record_event(event),
            None => stats.discarded += 1,
        }
    }
}

pub fn spawn(reader: RingReader, aggregator: Arc<Aggregator>) -> JoinHandle<(LoopExit, LoopStats)> {
    tokio::spawn(run(reader, aggregator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebpf::events::EventKind;
    use crate::ebpf::ring::ChannelSource;
    use bytes::Bytes;
    use iowatch_common::{kind, WriteEvent};

    fn event(bytes: u64, tag: u32) -> Bytes {
        Bytes::copy_from_slice(&WriteEvent::new(1, bytes, tag).to_le_bytes())
    }

    #[tokio::test]
    async fn aggregates_until_reader_closes() {
        let aggregator = Arc::new(Aggregator::new().unwrap());
        let (tx, source) = ChannelSource::new(16);
        let (reader, handle) = RingReader::new(Box::new(source));
        let task = spawn(reader, aggregator.clone());

        tx.send(Bytes::from_static(&[0u8; 12])).await.unwrap();
        tx.send(event(4096, kind::SYSCALL_WRITE)).await.unwrap();
        tx.send(event(128, kind::KERNEL_SEND)).await.unwrap();
        tx.send(event(1, 9)).await.unwrap();

        while aggregator.snapshot(EventKind::KernelSend).events == 0 {
            tokio::task::yield_now().await;
        }
        handle.close();

        let (exit, _stats) = task.await.unwrap();
        assert_eq!(exit, LoopExit::ReaderClosed);
        assert_eq!(aggregator.snapshot(EventKind::SyscallWrite).bytes, 4096);
        assert_eq!(aggregator.snapshot(EventKind::KernelSend).bytes, 128);
        assert_eq!(aggregator.snapshot(EventKind::UserProbeWrite).events, 0);
    }

    #[tokio::test]
    async fn source_failure_stops_the_loop() {
        let aggregator = Arc::new(Aggregator::new().unwrap());
        let (tx, source) = ChannelSource::new(4);
        let (reader, _handle) = RingReader::new(Box::new(source));

        tx.send(Bytes::from_static(&[1u8; 3])).await.unwrap();
        tx.send(event(10, kind::USER_PROBE_WRITE)).await.unwrap();
        drop(tx);

        let (exit, stats) = run(reader, aggregator.clone()).await;
        assert!(matches!(exit, LoopExit::ReadError(_)));
        assert_eq!(
            stats,
            LoopStats {
                records: 2,
                discarded: 1
            }
        );
        assert_eq!(aggregator.snapshot(EventKind::UserProbeWrite).events, 1);
    }
}
