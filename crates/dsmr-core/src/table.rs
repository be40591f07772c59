//! Code dispatch table — maps OBIS code prefixes to field descriptors.
//!
//! The P1 protocol uses fixed-width fields, so each descriptor carries
//! absolute byte offsets into the line rather than a grammar.

use std::collections::HashSet;

use crate::error::TableError;
use crate::types::{Direction, FieldDescriptor, MetricId, Tariff};

/// Upper bound for a descriptor's value offsets.
pub const MAX_LINE_LEN: usize = 1024;

/// kW and kWh to W and Wh.
const KILO: f64 = 1000.0;
/// Cubic meters to cubic centimeters.
const M3_TO_CM3: f64 = 1_000_000.0;

/// Readings exported from a DSMR telegram.
const DSMR_FIELDS: [FieldDescriptor; 7] = [
    FieldDescriptor {
        code: "1-0:1.8.1",
        value_start: 10,
        value_end: 20,
        scale: KILO,
        metric: MetricId::Energy {
            direction: Direction::Received,
            tariff: Tariff::Low,
        },
    },
    FieldDescriptor {
        code: "1-0:1.8.2",
        value_start: 10,
        value_end: 20,
        scale: KILO,
        metric: MetricId::Energy {
            direction: Direction::Received,
            tariff: Tariff::High,
        },
    },
    FieldDescriptor {
        code: "1-0:2.8.1",
        value_start: 10,
        value_end: 20,
        scale: KILO,
        metric: MetricId::Energy {
            direction: Direction::Delivered,
            tariff: Tariff::Low,
        },
    },
    FieldDescriptor {
        code: "1-0:2.8.2",
        value_start: 10,
        value_end: 20,
        scale: KILO,
        metric: MetricId::Energy {
            direction: Direction::Delivered,
            tariff: Tariff::High,
        },
    },
    FieldDescriptor {
        code: "1-0:1.7.0",
        value_start: 10,
        value_end: 16,
        scale: KILO,
        metric: MetricId::Power {
            direction: Direction::Received,
        },
    },
    FieldDescriptor {
        code: "1-0:2.7.0",
        value_start: 10,
        value_end: 16,
        scale: KILO,
        metric: MetricId::Power {
            direction: Direction::Delivered,
        },
    },
    // 0-1:24.2.1(<timestamp>)(<value>*m3): the value sits behind the capture time.
    FieldDescriptor {
        code: "0-1:24.2.1",
        value_start: 26,
        value_end: 35,
        scale: M3_TO_CM3,
        metric: MetricId::Gas,
    },
];

/// Validated set of field descriptors.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    fields: Vec<FieldDescriptor>,
}

impl DispatchTable {
    /// Build a table, checking that at most one descriptor can match any line.
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, TableError> {
        if fields.is_empty() {
            return Err(TableError::Empty);
        }

        let mut metrics = HashSet::new();
        for f in &fields {
            if f.code.is_empty() {
                return Err(TableError::EmptyCode(f.code));
            }
            if f.value_start >= f.value_end
                || f.value_end > MAX_LINE_LEN
                || f.value_start < f.code.len()
            {
                return Err(TableError::InvalidRange {
                    code: f.code,
                    start: f.value_start,
                    end: f.value_end,
                });
            }
            if !f.scale.is_finite() || f.scale == 0.0 {
                return Err(TableError::InvalidScale(f.code));
            }
            if !metrics.insert(f.metric) {
                return Err(TableError::DuplicateMetric(f.metric.to_string()));
            }
        }

        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                let (shorter, longer) = if a.code.len() <= b.code.len() {
                    (a.code, b.code)
                } else {
                    (b.code, a.code)
                };
                if longer.starts_with(shorter) {
                    return Err(TableError::OverlappingCodes { shorter, longer });
                }
            }
        }

        Ok(Self { fields })
    }

    /// The built-in DSMR table, validated like any other.
    pub fn try_dsmr() -> Result<Self, TableError> {
        Self::new(DSMR_FIELDS.to_vec())
    }

    /// The built-in DSMR table.
    pub fn dsmr() -> Self {
        Self {
            fields: DSMR_FIELDS.to_vec(),
        }
    }

    /// Find the descriptor whose code prefixes `line`.
    pub fn lookup(&self, line: &[u8]) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| line.starts_with(f.code.as_bytes()))
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Every metric this table can produce, in table order.
    pub fn metrics(&self) -> impl Iterator<Item = MetricId> + '_ {
        self.fields.iter().map(|f| f.metric)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::dsmr()
    }
}
