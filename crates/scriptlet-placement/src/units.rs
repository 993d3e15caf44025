//! Byte size and CPU set parsing.

use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("Invalid byte size {input:?}: {reason}")]
    ByteSize { input: String, reason: &'static str },

    #[error("Invalid CPU set {input:?}: {reason}")]
    CpuSet { input: String, reason: &'static str },
}

/// Largest range accepted in a CPU set.
const MAX_CPU_RANGE: u32 = 65_536;

/// Parse integer sizes such as `"512"`, `"512B"` or `"10GiB"`.
///
/// Decimal suffixes (`kB`, `MB`, ...) are powers of 1000, binary suffixes
/// (`KiB`, `MiB`, ...) powers of 1024.
pub fn parse_byte_size(input: &str) -> Result<u64, UnitError> {
    let error = |reason| UnitError::ByteSize {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    if digits.is_empty() {
        return Err(error("missing number"));
    }
    let value: u64 = digits.parse().map_err(|_| error("number out of range"))?;

    let multiplier: u64 = match suffix.trim() {
        "" | "B" => 1,
        "kB" | "KB" => 1000,
        "MB" => 1000u64.pow(2),
        "GB" => 1000u64.pow(3),
        "TB" => 1000u64.pow(4),
        "PB" => 1000u64.pow(5),
        "EB" => 1000u64.pow(6),
        "KiB" => 1 << 10,
        "MiB" => 1 << 20,
        "GiB" => 1 << 30,
        "TiB" => 1 << 40,
        "PiB" => 1 << 50,
        "EiB" => 1 << 60,
        _ => return Err(error("unknown suffix")),
    };

    value.checked_mul(multiplier).ok_or_else(|| error("overflow"))
}

/// Parse a CPU set such as `"0-3,8,10-11"` into sorted, unique CPU ids.
pub fn parse_cpuset(input: &str) -> Result<Vec<u32>, UnitError> {
    let error = |reason| UnitError::CpuSet {
        input: input.to_string(),
        reason,
    };
    let id = |s: &str| s.trim().parse::<u32>().map_err(|_| error("invalid CPU id"));

    if input.trim().is_empty() {
        return Err(error("empty"));
    }

    let mut cpus = BTreeSet::new();
    for part in input.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (id(start)?, id(end)?);
                if start > end {
                    return Err(error("range start after end"));
                }
                if end - start >= MAX_CPU_RANGE {
                    return Err(error("range too large"));
                }
                cpus.extend(start..=end);
            }
            None => {
                cpus.insert(id(part)?);
            }
        }
    }

    Ok(cpus.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes() {
        assert_eq!(parse_byte_size("512"), Ok(512));
        assert_eq!(parse_byte_size("512B"), Ok(512));
        assert_eq!(parse_byte_size("2kB"), Ok(2_000));
        assert_eq!(parse_byte_size("3MB"), Ok(3_000_000));
        assert_eq!(parse_byte_size("1GiB"), Ok(1 << 30));
        assert_eq!(parse_byte_size("10GiB"), Ok(10 * (1 << 30)));
        assert_eq!(parse_byte_size(" 4 MiB "), Ok(4 << 20));
    }

    #[test]
    fn bad_byte_sizes() {
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("GiB").is_err());
        assert!(parse_byte_size("-1GiB").is_err());
        assert!(parse_byte_size("1.5GiB").is_err());
        assert!(parse_byte_size("10 parsecs").is_err());
        assert!(parse_byte_size("100EiB").is_err());
        assert!(matches!(
            parse_byte_size("99999999999999999999"),
            Err(UnitError::ByteSize { reason: "number out of range", .. })
        ));
    }

    #[test]
    fn cpusets() {
        assert_eq!(parse_cpuset("0"), Ok(vec![0]));
        assert_eq!(parse_cpuset("0-3"), Ok(vec![0, 1, 2, 3]));
        assert_eq!(parse_cpuset("8,0-1, 10-11"), Ok(vec![0, 1, 8, 10, 11]));
        assert_eq!(parse_cpuset("1,1,0-1"), Ok(vec![0, 1]));
    }

    #[test]
    fn bad_cpusets() {
        assert!(parse_cpuset("").is_err());
        assert!(parse_cpuset("a").is_err());
        assert!(parse_cpuset("3-1").is_err());
        assert!(parse_cpuset("0,,1").is_err());
        assert!(parse_cpuset("0-4294967295").is_err());
    }
}
