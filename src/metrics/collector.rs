use crate::ebpf::events::{DecodedEvent, EventKind};
use crate::{IowatchError, Result};
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

/// Point-in-time counters for one event kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounters {
    pub events: u64,
    pub bytes: u64,
}

/// Cumulative event and byte counters per [`EventKind`]
///
/// Every counter is an independent atomic, so `record` never blocks readers
/// and any number of writers may call it. A reader can observe the event
/// count of a record before its bytes; each field on its own only grows.
pub struct Aggregator {
    registry: Registry,
    events: [IntCounter; 3],
    bytes: [IntCounter; 3],
}

struct MetricNames {
    events: (&'static str, &'static str),
    bytes: (&'static str, &'static str),
}

fn metric_names(kind: EventKind) -> MetricNames {
    match kind {
        EventKind::SyscallWrite => MetricNames {
            events: ("app_write_events_total", "Events (sys_enter_write)."),
            bytes: ("app_write_bytes_total", "Bytes (sys_enter_write)."),
        },
        EventKind::KernelSend => MetricNames {
            events: ("app_tcp_send_events_total", "Events via kprobe tcp_sendmsg."),
            bytes: ("app_tcp_send_bytes_total", "Bytes via kprobe tcp_sendmsg."),
        },
        EventKind::UserProbeWrite => MetricNames {
            events: ("app_uprobe_calls_total", "Calls to the uprobed write marker."),
            bytes: ("app_uprobe_bytes_total", "Bytes via uprobe on the write marker."),
        },
    }
}

fn register_counter(registry: &Registry, (name, help): (&str, &str)) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Aggregator {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let mut events = Vec::with_capacity(EventKind::ALL.len());
        let mut bytes = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let names = metric_names(kind);
            events.push(register_counter(&registry, names.events)?);
            bytes.push(register_counter(&registry, names.bytes)?);
        }

        Ok(Self {
            registry,
            events: per_kind(events)?,
            bytes: per_kind(bytes)?,
        })
    }

    pub fn record(&self, kind: EventKind, bytes: u64) {
        self.events[kind.index()].inc();
        self.bytes[kind.index()].inc_by(bytes);
    }

    pub fn record_event(&self, event: DecodedEvent) {
        self.record(event.kind, event.bytes);
    }

    pub fn snapshot(&self, kind: EventKind) -> KindCounters {
        KindCounters {
            events: self.events[kind.index()].get(),
            bytes: self.bytes[kind.index()].get(),
        }
    }

    /// Render every counter in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| IowatchError::Metrics(e.to_string()))
    }
}

fn per_kind(counters: Vec<IntCounter>) -> Result<[IntCounter; 3]> {
    counters.try_into().map_err(|left: Vec<IntCounter>| {
        IowatchError::Metrics(format!("expected 3 counters, built {}", left.len()))
    })
}
