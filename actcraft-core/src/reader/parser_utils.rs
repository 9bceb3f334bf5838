//! Common parsing utilities shared by the XLSX reader and writer

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use quick_xml::Reader;
use quick_xml::events::Event;

/// Parse a cell reference like "A1" into (row, col) as 0-based indices
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        }
    }

    if row_str.is_empty() {
        return None;
    }

    let row = row_str.parse::<u32>().ok()?;

    // Convert to 0-based
    Some((row.saturating_sub(1), col.saturating_sub(1)))
}

/// Read text content from an XML node
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Check if a number format code represents a date or datetime
pub fn is_date_format(fmt: &str) -> bool {
    let lower = fmt.to_lowercase();
    if lower.contains("general") {
        return false;
    }

    // Drop literal sections ("..."), escapes and bracketed colors/locales
    let mut code = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut chars = lower.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '\\' if !in_quotes => {
                chars.next();
            }
            _ if in_quotes || in_brackets => {}
            _ => code.push(ch),
        }
    }

    if code.contains('d') || code.contains('y') {
        return true;
    }
    // Bare 'm' is a month unless the code is a time or number format
    code.contains('m')
        && !code.contains('h')
        && !code.contains('s')
        && !code.contains('0')
        && !code.contains('#')
}

/// Convert a spreadsheet serial number into a datetime
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        // Day 60 is the fictitious 1900-02-29; the 1899-12-30 epoch absorbs it
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("B2"), Some((1, 1)));
        assert_eq!(parse_cell_ref("Z26"), Some((25, 25)));
        assert_eq!(parse_cell_ref("AA1"), Some((0, 26)));
        assert_eq!(parse_cell_ref("AB10"), Some((9, 27)));
        assert_eq!(parse_cell_ref("AB"), None);
    }

    #[test]
    fn test_is_date_format() {
        assert!(is_date_format("dd.mm.yyyy"));
        assert!(is_date_format("mm-dd-yy"));
        assert!(is_date_format("m/d/yy h:mm"));
        assert!(is_date_format("[$-419]d mmmm yyyy"));
        assert!(is_date_format("mmm"));
        assert!(!is_date_format("General"));
        assert!(!is_date_format("0.00"));
        assert!(!is_date_format("#,##0"));
        assert!(!is_date_format("h:mm"));
        assert!(!is_date_format("@"));
        assert!(!is_date_format("[Red]0.00"));
        assert!(!is_date_format("0 \"дней\""));
    }

    #[test]
    fn test_serial_to_datetime() {
        let dt = serial_to_datetime(45853.0, false).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 7, 15).unwrap());

        let dt = serial_to_datetime(45853.5, false).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "12:00");

        let dt = serial_to_datetime(0.0, true).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(1904, 1, 1).unwrap());

        assert!(serial_to_datetime(-1.0, false).is_none());
    }
}
