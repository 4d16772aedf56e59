//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV parser and the now/next resolver.

mod parser;
mod schedule;

// Re-export public types
pub use parser::{parse_xmltv_time, Channel, EpgDocument, EpgParser, Programme};
pub use schedule::{NextPolicy, Schedule};

use chrono::NaiveDateTime;

/// Format a programme time as HH:MM
pub fn format_time(ts: NaiveDateTime) -> String {
    ts.format("%H:%M").to_string()
}

/// Format a timestamp as dd/mm/YYYY HH:MM
pub fn format_datetime(ts: NaiveDateTime) -> String {
    ts.format("%d/%m/%Y %H:%M").to_string()
}
