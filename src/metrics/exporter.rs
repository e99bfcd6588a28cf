use crate::metrics::collector::Poll;
use crate::Result;
use portwatch_common::Stat;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;
use tracing::debug;

/// Prometheus view of the port counters, fed one poll at a time
pub struct PrometheusExporter {
    registry: Registry,
    tcp_packets: IntCounterVec,
    skipped_packets: IntCounterVec,
    table_full: IntCounter,
    tracked_ports: IntGauge,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tcp_packets = IntCounterVec::new(
            Opts::new(
                "portwatch_tcp_packets_total",
                "TCP packets observed per destination port",
            ),
            &["port"],
        )?;
        let skipped_packets = IntCounterVec::new(
            Opts::new(
                "portwatch_skipped_packets_total",
                "Packets passed through without counting, by reason",
            ),
            &["reason"],
        )?;
        let table_full = IntCounter::new(
            "portwatch_table_full_total",
            "TCP packets whose count was lost because the port table was full",
        )?;
        let tracked_ports = IntGauge::new(
            "portwatch_tracked_ports",
            "Distinct destination ports in the counter table",
        )?;

        registry.register(Box::new(tcp_packets.clone()))?;
        registry.register(Box::new(skipped_packets.clone()))?;
        registry.register(Box::new(table_full.clone()))?;
        registry.register(Box::new(tracked_ports.clone()))?;

        Ok(Self {
            registry,
            tcp_packets,
            skipped_packets,
            table_full,
            tracked_ports,
        })
    }

    pub fn observe(&self, poll: &Poll) {
        for delta in &poll.deltas {
            let port = delta.port.to_string();
            self.tcp_packets
                .with_label_values(&[port.as_str()])
                .inc_by(delta.delta);
        }

        for (stat, delta) in &poll.stat_deltas {
            match stat {
                Stat::Counted => {}
                Stat::TableFull => self.table_full.inc_by(*delta),
                skipped => self
                    .skipped_packets
                    .with_label_values(&[skipped.as_str()])
                    .inc_by(*delta),
            }
        }

        self.tracked_ports.set(poll.tracked_ports as i64);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }

    /// Write the exposition atomically, for node_exporter's textfile collector
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, path)?;
        debug!("Wrote metrics to {}", path.display());
        Ok(())
    }
}
