//! Resource quantity parsing.
//!
//! Both parsers are parse-or-zero: a quantity that cannot be read contributes
//! nothing to a total instead of failing the collection pass.

use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Parses a CPU quantity ("500m", "2", "250u") into cores.
pub fn parse_cpu_or_zero(raw: &str) -> f64 {
    match parse_cpu(raw.trim()) {
        Some(cores) => cores,
        None => {
            debug!("unparseable cpu quantity {:?}, counting as 0", raw);
            0.0
        }
    }
}

/// Parses a memory quantity into GiB.
///
/// Binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`) normalize to GiB and decimal
/// suffixes (`K`, `M`, `G`, `T`, `P`) to GB; the two are summed together
/// without conversion. Suffixes match case-insensitively. A bare number is
/// bytes.
pub fn parse_memory_or_zero(raw: &str) -> f64 {
    match parse_memory(raw.trim()) {
        Some(gib) => gib,
        None => {
            debug!("unparseable memory quantity {:?}, counting as 0", raw);
            0.0
        }
    }
}

fn parse_cpu(s: &str) -> Option<f64> {
    let (number, divisor) = if let Some(n) = s.strip_suffix('m') {
        (n, 1e3)
    } else if let Some(n) = s.strip_suffix('u') {
        (n, 1e6)
    } else if let Some(n) = s.strip_suffix('n') {
        (n, 1e9)
    } else {
        (s, 1.0)
    };
    parse_finite(number).map(|v| v / divisor)
}

fn parse_memory(s: &str) -> Option<f64> {
    let upper = s.to_ascii_uppercase();

    // Two-letter binary suffixes must be checked before their decimal prefixes.
    const TABLE: &[(&str, f64)] = &[
        ("KI", 1.0 / (1024.0 * 1024.0)),
        ("MI", 1.0 / 1024.0),
        ("GI", 1.0),
        ("TI", 1024.0),
        ("PI", 1024.0 * 1024.0),
        ("K", 1.0 / 1e6),
        ("M", 1.0 / 1e3),
        ("G", 1.0),
        ("T", 1e3),
        ("P", 1e6),
    ];

    for (suffix, factor) in TABLE {
        if let Some(number) = upper.strip_suffix(suffix) {
            return parse_finite(number).map(|v| v * factor);
        }
    }

    parse_finite(&upper).map(|bytes| bytes / GIB)
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
