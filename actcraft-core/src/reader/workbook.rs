//! Row and cell data structures

use chrono::NaiveDateTime;

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Numeric cell whose number format is a date or datetime format
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Check if the cell is empty (blank text counts as empty)
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Stringify the value the way it reads in a document.
    ///
    /// Integral numbers lose their fractional part (`12.0` becomes `"12"`),
    /// dates keep an ISO form; use `normalizer::format_date` for act dates.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(text) => text.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.date().to_string()
                } else {
                    dt.to_string()
                }
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One input row as read from the source sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// 1-based row number in the source sheet
    pub row: u32,
    /// Values by 0-based column index; missing trailing cells are absent
    pub cells: Vec<CellValue>,
}

impl RawRecord {
    pub fn new(row: u32, cells: Vec<CellValue>) -> Self {
        Self { row, cells }
    }

    /// Get the value at a column, `Empty` when the row is shorter
    pub fn get(&self, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(col).unwrap_or(&EMPTY)
    }
}
