use iowatch::ebpf::events::EventKind;
use iowatch::error::{IowatchError, Result};
use iowatch::metrics::{Aggregator, PrometheusExporter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod common;

#[test]
fn test_error_types() {
    let err = IowatchError::AttachFailed {
        probe: "kprobe/tcp_sendmsg".to_string(),
        reason: "symbol not found".to_string(),
    };

    assert!(err.to_string().contains("kprobe/tcp_sendmsg"));
    assert!(err.to_string().contains("symbol not found"));
}

#[test]
fn test_io_error_converts() {
    fn open() -> Result<()> {
        std::fs::read("/nonexistent/iowatch/object.o")?;
        Ok(())
    }

    assert!(matches!(open(), Err(IowatchError::Io(_))));
}

#[test]
fn test_version_const() {
    assert!(!iowatch::VERSION.is_empty());
}

#[tokio::test]
async fn test_exporter_serves_text_format() {
    let aggregator = Arc::new(Aggregator::new().unwrap());
    aggregator.record(EventKind::KernelSend, 1500);
    aggregator.record(EventKind::KernelSend, 500);

    let exporter = PrometheusExporter::bind("127.0.0.1:0".parse().unwrap(), aggregator.clone())
        .await
        .unwrap();
    let addr = exporter.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = exporter.spawn(shutdown.clone());

    let response = common::scrape(addr).await;
    assert!(response.contains("text/plain; version=0.0.4"), "{response}");
    assert!(response.contains("app_tcp_send_events_total 2"), "{response}");
    assert!(response.contains("app_tcp_send_bytes_total 2000"), "{response}");

    aggregator.record(EventKind::KernelSend, 1);
    let response = common::scrape(addr).await;
    assert!(response.contains("app_tcp_send_events_total 3"), "{response}");

    shutdown.cancel();
    common::within(server).await.unwrap();
}
