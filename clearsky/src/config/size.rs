//! Human-readable size parsing (e.g., "64KB", "2GB").

use std::fmt;
use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '64KB', '16MB' or '1GB'")]
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

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Parse a human-readable size string into bytes.
///
/// Accepts a bare byte count or a `B`, `KB`/`K`, `MB`/`M`, `GB`/`G` suffix
/// (binary multiples), case-insensitive, with optional whitespace.
///
/// ```
/// use clearsky::config::parse_size;
///
/// assert_eq!(parse_size("64KB").unwrap(), 65536);
/// assert_eq!(parse_size("1 mb").unwrap(), 1024 * 1024);
/// assert_eq!(parse_size("512B").unwrap(), 512);
/// ```
pub fn parse_size(s: &str) -> Result<usize, SizeParseError> {
    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (suffix_len, multiplier) = [
        ("GB", GB),
        ("G", GB),
        ("MB", MB),
        ("M", MB),
        ("KB", KB),
        ("K", KB),
        ("B", 1),
    ]
    .iter()
    .find(|(suffix, _)| upper.ends_with(suffix))
    .map(|(suffix, multiplier)| (suffix.len(), *multiplier))
    .unwrap_or((0, 1));

    let number = trimmed[..trimmed.len() - suffix_len].trim();
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SizeParseError::new(s));
    }
    let value: usize = number.parse().map_err(|_| SizeParseError::new(s))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| SizeParseError::new(s))
}

/// Format a byte count using the largest exact unit.
pub fn format_size(bytes: usize) -> String {
    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{}B", bytes)
    }
}

/// A byte size that parses from and formats to human-readable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size(pub usize);

impl Size {
    pub fn bytes(self) -> usize {
        self.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl std::str::FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_size("16MB").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_size("  64 KB ").unwrap(), 64 * 1024);
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "KB", "abc", "-1KB", "1.5MB", "2TB", "+4K"] {
            assert!(parse_size(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(64 * 1024), "64KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3MB");
        assert_eq!(format_size(1000), "1000B");
        assert_eq!(Size(GB).to_string(), "1GB");
        assert_eq!("64KB".parse::<Size>().unwrap().bytes(), 65536);
    }
}
