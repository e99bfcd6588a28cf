pub mod collector;
pub mod exporter;

pub use collector::{PortCollector, PortDelta, Poll};
pub use exporter::PrometheusExporter;
