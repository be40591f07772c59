//! Line decoder — classifies one raw line and converts its reading.
//!
//! Lines are passed as received, trailing `\r\n` included. The decoder
//! never touches metric state; callers apply the returned update.

use crate::table::DispatchTable;
use crate::types::{DecodeOutcome, Update};

/// Decode a single line against `table`.
pub fn decode(line: &[u8], table: &DispatchTable) -> DecodeOutcome {
    let Some(field) = table.lookup(line) else {
        return DecodeOutcome::NoMatch;
    };

    let Some(raw) = line.get(field.value_start..field.value_end) else {
        // Short line: report whatever followed the value offset.
        let tail = line.get(field.value_start..).unwrap_or_default();
        return DecodeOutcome::ParseFailure {
            code: field.code,
            text: lossy_trimmed(tail),
        };
    };

    match parse_fixed_decimal(raw) {
        Some(parsed) => DecodeOutcome::Update(Update {
            metric: field.metric,
            value: parsed * field.scale,
        }),
        None => DecodeOutcome::ParseFailure {
            code: field.code,
            text: lossy_trimmed(raw),
        },
    }
}

/// Parse an unsigned fixed-point decimal such as `001234.567`.
///
/// Signs, exponents, `inf` and `NaN` are rejected.
fn parse_fixed_decimal(raw: &[u8]) -> Option<f64> {
    let mut digits = 0usize;
    let mut dots = 0usize;
    for &b in raw {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }
    // Only ASCII digits and '.' remain, so this is valid UTF-8.
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn lossy_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
