//! Prometheus text exposition format.
//!
//! Renders a metric state snapshot into the text format scraped by a
//! Prometheus server or compatible agent.

use dsmr_core::{Direction, MetricId, Tariff};

use crate::state::Snapshot;

/// One representative per reading family, in exposition order.
const FAMILIES: [MetricId; 3] = [
    MetricId::Energy {
        direction: Direction::Received,
        tariff: Tariff::Low,
    },
    MetricId::Power {
        direction: Direction::Received,
    },
    MetricId::Gas,
];

/// Render a snapshot into Prometheus text format.
///
/// Family headers are always present; samples only for readings that
/// have been set at least once.
pub fn render_prometheus(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    for family in FAMILIES {
        push_header(&mut out, family.name(), family.help(), family.kind().as_str());
        for (metric, reading) in snapshot
            .readings
            .iter()
            .filter(|(m, _)| m.name() == family.name())
        {
            out.push_str(&format!("{metric} {}\n", reading.value));
        }
    }

    push_header(
        &mut out,
        "dsmr_reading_updated_timestamp_seconds",
        "Unix time of the last successful update of each reading.",
        "gauge",
    );
    for (metric, reading) in &snapshot.readings {
        let mut labels = format!("metric=\"{}\"", metric.name());
        for (k, v) in metric.labels() {
            labels.push_str(&format!(",{k}=\"{v}\""));
        }
        out.push_str(&format!(
            "dsmr_reading_updated_timestamp_seconds{{{labels}}} {:.3}\n",
            reading.updated_at_ms as f64 / 1000.0
        ));
    }

    push_header(
        &mut out,
        "dsmr_ingest_up",
        "Whether the telegram ingestion loop is running (1) or has stopped (0).",
        "gauge",
    );
    out.push_str(&format!(
        "dsmr_ingest_up {}\n",
        u8::from(snapshot.status.is_running())
    ));

    let counters = [
        ("dsmr_lines_total", "Telegram lines read from the source.", snapshot.counters.lines),
        ("dsmr_updates_total", "Readings updated from decoded lines.", snapshot.counters.updates),
        (
            "dsmr_parse_failures_total",
            "Lines with a known code but a malformed value.",
            snapshot.counters.parse_failures,
        ),
    ];
    for (name, help, value) in counters {
        push_header(&mut out, name, help, "counter");
        out.push_str(&format!("{name} {value}\n"));
    }

    out
}

fn push_header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}
