//! Collector report line.

use chrono::{DateTime, Utc};
use std::fmt;

/// One temperature report.
///
/// Renders as `YYYY-MM-DD HH:MM:SS+0000,<group>,<celsius>,<tag>\n` with the
/// temperature at four decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Report<'a> {
    pub timestamp: DateTime<Utc>,
    pub group_id: u32,
    pub celsius: f32,
    pub tag: &'a str,
}

impl Report<'_> {
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{},{},{:.4},{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%z"),
            self.group_id,
            self.celsius,
            self.tag
        )
    }
}
