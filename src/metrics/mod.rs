pub mod collector;
pub mod exporter;

pub use collector::{Aggregator, KindCounters};
pub use exporter::PrometheusExporter;
