//! Human-readable byte sizes ("4GB", "512MB") for budgets and ceilings.

use std::fmt;
use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{input}' - expected a byte count or a value like '4GB', '512MB', '1.5G'")]
pub struct SizeParseError {
    input: String,
}

impl SizeParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Parse a human-readable size string into bytes.
///
/// Accepts bare byte counts and `KB`/`MB`/`GB` suffixes (also the one-letter
/// forms), case-insensitive, with optional whitespace between number and
/// suffix. Decimal values are allowed for suffixed forms, so memory budgets
/// like `1.5GB` work.
///
/// # Examples
///
/// ```
/// use eeg2source::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("4GB").unwrap(), 4 * 1024 * 1024 * 1024);
/// assert_eq!(parse_size("512 mb").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("1.5G").unwrap(), 3 * 512 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::new(s));
    }

    let upper = trimmed.to_uppercase();
    let suffixes: [(&str, u64); 7] = [
        ("GB", GIB),
        ("MB", MIB),
        ("KB", KIB),
        ("G", GIB),
        ("M", MIB),
        ("K", KIB),
        ("B", 1),
    ];

    for (suffix, multiplier) in suffixes {
        if let Some(number) = upper.strip_suffix(suffix) {
            let number = number.trim();
            let value: f64 = number.parse().map_err(|_| SizeParseError::new(trimmed))?;
            if !value.is_finite() || value < 0.0 {
                return Err(SizeParseError::new(trimmed));
            }
            let bytes = value * multiplier as f64;
            if bytes > u64::MAX as f64 {
                return Err(SizeParseError::new(trimmed));
            }
            return Ok(bytes.round() as u64);
        }
    }

    // No suffix: a plain byte count, integral only.
    trimmed
        .parse::<u64>()
        .map_err(|_| SizeParseError::new(trimmed))
}

/// Format a byte count as a human-readable string.
///
/// Sizes that divide evenly get the largest fitting suffix; everything else
/// is rendered with one decimal place of the nearest unit so log lines and
/// summaries stay readable.
///
/// # Examples
///
/// ```
/// use eeg2source::config::format_size;
///
/// assert_eq!(format_size(4 * 1024 * 1024 * 1024), "4GB");
/// assert_eq!(format_size(512 * 1024 * 1024), "512MB");
/// assert_eq!(format_size(1536), "1.5KB");
/// assert_eq!(format_size(640), "640B");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes >= GIB {
        if bytes % GIB == 0 {
            format!("{}GB", bytes / GIB)
        } else {
            format!("{:.1}GB", bytes as f64 / GIB as f64)
        }
    } else if bytes >= MIB {
        if bytes % MIB == 0 {
            format!("{}MB", bytes / MIB)
        } else {
            format!("{:.1}MB", bytes as f64 / MIB as f64)
        }
    } else if bytes >= KIB {
        if bytes % KIB == 0 {
            format!("{}KB", bytes / KIB)
        } else {
            format!("{:.1}KB", bytes as f64 / KIB as f64)
        }
    } else {
        format!("{}B", bytes)
    }
}

/// A byte size parseable from and formatted to human-readable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn from_gb(gb: u64) -> Self {
        Self(gb * GIB)
    }

    pub fn from_mb(mb: u64) -> Self {
        Self(mb * MIB)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_size(self.0))
    }
}

impl std::str::FromStr for ByteSize {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(ByteSize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_byte_counts() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("  123  ").unwrap(), 123);
        assert_eq!(parse_size("640B").unwrap(), 640);
    }

    #[test]
    fn parses_suffixed_sizes() {
        assert_eq!(parse_size("1KB").unwrap(), KIB);
        assert_eq!(parse_size("1k").unwrap(), KIB);
        assert_eq!(parse_size("512MB").unwrap(), 512 * MIB);
        assert_eq!(parse_size("512 m").unwrap(), 512 * MIB);
        assert_eq!(parse_size("4GB").unwrap(), 4 * GIB);
        assert_eq!(parse_size("4gb").unwrap(), 4 * GIB);
    }

    #[test]
    fn parses_decimal_budgets() {
        assert_eq!(parse_size("1.5GB").unwrap(), 3 * GIB / 2);
        assert_eq!(parse_size("0.5G").unwrap(), GIB / 2);
        assert_eq!(parse_size("2.5MB").unwrap(), 5 * MIB / 2);
    }

    #[test]
    fn rejects_junk() {
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("4TB").is_err());
        assert!(parse_size("-1GB").is_err());
        assert!(parse_size("1.5").is_err()); // decimals need a suffix
    }

    #[test]
    fn formats_round_and_fractional() {
        assert_eq!(format_size(4 * GIB), "4GB");
        assert_eq!(format_size(512 * MIB), "512MB");
        assert_eq!(format_size(KIB), "1KB");
        assert_eq!(format_size(3 * GIB / 2), "1.5GB");
        assert_eq!(format_size(100), "100B");
    }

    #[test]
    fn byte_size_round_trips() {
        let size: ByteSize = "4GB".parse().unwrap();
        assert_eq!(size.bytes(), 4 * GIB);
        assert_eq!(size.to_string(), "4GB");
        assert_eq!(ByteSize::from_mb(512).to_string(), "512MB");
    }
}
