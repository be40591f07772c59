//! Shared types: metric identities, field descriptors, decode outcomes.

use std::fmt;

/// Energy flow direction as seen from the household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Drawn from the grid.
    Received,
    /// Fed back into the grid.
    Delivered,
}

impl Direction {
    pub fn as_label(&self) -> &'static str {
        match self {
            Direction::Received => "received",
            Direction::Delivered => "delivered",
        }
    }
}

/// Billing tier. DSMR tariff 1 is the low rate, tariff 2 the high rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tariff {
    Low,
    High,
}

impl Tariff {
    pub fn as_label(&self) -> &'static str {
        match self {
            Tariff::Low => "low",
            Tariff::High => "high",
        }
    }
}

/// Kind of metric family, used to group samples under one HELP/TYPE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic meter reading.
    Counter,
    /// Instantaneous value.
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Identity of one stored reading: a metric family plus its label values.
///
/// The exposed names and label values are part of the scrape contract and
/// must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricId {
    /// Cumulative electricity meter reading, watt-hours.
    Energy { direction: Direction, tariff: Tariff },
    /// Instantaneous power, watts.
    Power { direction: Direction },
    /// Cumulative gas meter reading, cubic centimeters.
    Gas,
}

impl MetricId {
    /// Exposed metric family name.
    pub fn name(&self) -> &'static str {
        match self {
            MetricId::Energy { .. } => "dsmr_energy_watthours",
            MetricId::Power { .. } => "dsmr_power_watts",
            MetricId::Gas => "dsmr_gas_cubic_centimeters",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MetricId::Energy { .. } => "Cumulative electricity meter reading in watt-hours.",
            MetricId::Power { .. } => "Instantaneous electrical power in watts.",
            MetricId::Gas => "Cumulative gas meter reading in cubic centimeters.",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricId::Power { .. } => MetricKind::Gauge,
            MetricId::Energy { .. } | MetricId::Gas => MetricKind::Counter,
        }
    }

    /// Label pairs in exposition order.
    pub fn labels(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            MetricId::Energy { direction, tariff } => vec![
                ("direction", direction.as_label()),
                ("tariff", tariff.as_label()),
            ],
            MetricId::Power { direction } => vec![("direction", direction.as_label())],
            MetricId::Gas => Vec::new(),
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        let labels = self.labels();
        if !labels.is_empty() {
            f.write_str("{")?;
            for (i, (k, v)) in labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}=\"{v}\"")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// Where a reading lives inside a line and how to convert it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Byte prefix identifying the line (the OBIS reference).
    pub code: &'static str,
    /// Start offset of the numeric field, inclusive.
    pub value_start: usize,
    /// End offset of the numeric field, exclusive.
    pub value_end: usize,
    /// Multiplier from the meter's unit to the stored unit.
    pub scale: f64,
    pub metric: MetricId,
}

/// A converted value ready to be stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
    pub metric: MetricId,
    pub value: f64,
}

/// Result of decoding a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The line carries no code of interest.
    NoMatch,
    /// The code matched but the numeric field was short or malformed.
    ParseFailure { code: &'static str, text: String },
    Update(Update),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_labels() {
        let id = MetricId::Energy {
            direction: Direction::Received,
            tariff: Tariff::Low,
        };
        assert_eq!(
            id.to_string(),
            "dsmr_energy_watthours{direction=\"received\",tariff=\"low\"}"
        );
        assert_eq!(MetricId::Gas.to_string(), "dsmr_gas_cubic_centimeters");
    }

    #[test]
    fn kinds() {
        assert_eq!(MetricId::Gas.kind(), MetricKind::Counter);
        assert_eq!(
            MetricId::Power { direction: Direction::Delivered }.kind(),
            MetricKind::Gauge
        );
    }
}
