//! Record normalization: positional cells to a typed act record

use chrono::NaiveDate;

use crate::error::RecordError;
use crate::reader::{CellValue, RawRecord};

/// Material field value that points to an external registry
pub const REGISTRY_SENTINEL: &str = "Реестр";

/// Text used when the next work column is empty
pub const DEFAULT_NEXT_WORK: &str = "Согласно проекта";

/// Date format used throughout the acts
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Format a date-bearing cell: dates as `DD.MM.YYYY`, other values as-is, empty as ""
pub fn format_date(value: &CellValue) -> String {
    match value {
        CellValue::DateTime(dt) => dt.format(DATE_FORMAT).to_string(),
        CellValue::Text(text) => text.trim().to_string(),
        other => other.to_text(),
    }
}

/// A date column rendered for the document plus its calendar date, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateField {
    pub text: String,
    pub date: Option<NaiveDate>,
}

impl DateField {
    pub fn from_cell(value: &CellValue) -> Self {
        let text = format_date(value);
        let date = match value {
            CellValue::DateTime(dt) => Some(dt.date()),
            CellValue::Text(_) => parse_date_text(&text),
            _ => None,
        };
        Self { text, date }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Dates typed as text still count for the effective date
fn parse_date_text(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .ok()
}

/// One material sub-entry: its number (or name) and the paired date text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialPart {
    pub number: String,
    pub date: String,
}

impl MaterialPart {
    pub fn new(number: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            date: date.into(),
        }
    }
}

/// How the material column of a record has to be narrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialEntry {
    /// Materials are listed in an external registry
    Registry,
    /// Two sub-entries packed into one cell, one per line
    MultiValue([MaterialPart; 2]),
    Single(MaterialPart),
}

impl MaterialEntry {
    /// Classify a material number cell and its paired date cell
    pub fn detect(number: &str, date: &str) -> Result<Self, RecordError> {
        let number = number.trim();
        if number == REGISTRY_SENTINEL {
            return Ok(MaterialEntry::Registry);
        }

        let numbers = split_lines(number);
        // A single material keeps its paired text whole, line breaks included
        if numbers.len() == 1 {
            return Ok(MaterialEntry::Single(MaterialPart::new(number, date.trim())));
        }
        if numbers.len() > 2 {
            return Err(RecordError::TooManyParts {
                field: "material",
                found: numbers.len(),
                max: 2,
            });
        }

        let dates = split_lines(date.trim());
        match (numbers.as_slice(), dates.as_slice()) {
            ([n1, n2], [d1, d2]) => Ok(MaterialEntry::MultiValue([
                MaterialPart::new(*n1, *d1),
                MaterialPart::new(*n2, *d2),
            ])),
            _ => Err(RecordError::MismatchedParts {
                field: "material",
                parts: numbers.len(),
                paired: "material date",
                paired_parts: dates.len(),
            }),
        }
    }

    pub fn is_multi_value(&self) -> bool {
        matches!(self, MaterialEntry::MultiValue(_))
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').map(|line| line.trim_end_matches('\r').trim()).collect()
}

/// Whether the material column is inspected or the registry is implied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialMode {
    Detect,
    AlwaysRegistry,
}

/// 0-based source columns of each field; `None` when a flavor has no such column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub id: usize,
    pub act_number: usize,
    pub work_name: usize,
    pub code: usize,
    pub start_date: Option<usize>,
    pub end_date: Option<usize>,
    pub lab_date: Option<usize>,
    pub agreement_date: Option<usize>,
    pub material_type: Option<usize>,
    pub material_number: Option<usize>,
    pub material_date: Option<usize>,
    pub lab_primary: Option<usize>,
    pub lab_secondary: Option<usize>,
    pub next_work: Option<usize>,
    pub material_mode: MaterialMode,
}

/// Options that shape normalization independently of the flavor
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Rendered for act number, work name and code when the cell is empty
    pub missing_text: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            missing_text: "—".to_string(),
        }
    }
}

/// Typed projection of one input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    /// Identifier used to name the output artifact
    pub id: String,
    /// 1-based source row
    pub row: u32,
    pub act_number: String,
    pub work_name: String,
    pub code: String,
    pub start_date: DateField,
    pub end_date: DateField,
    pub material_date: DateField,
    pub lab_date: DateField,
    pub agreement_date: DateField,
    pub material_type: String,
    /// Raw text of the material number cell
    pub material_number: String,
    pub material: MaterialEntry,
    pub lab_primary: String,
    pub lab_secondary: String,
    pub next_work: String,
}

/// Normalize a raw row. Rows with an empty identifier yield `Ok(None)`.
pub fn normalize(
    raw: &RawRecord,
    layout: &ColumnLayout,
    options: &NormalizeOptions,
) -> Result<Option<NormalizedRecord>, RecordError> {
    let id = raw.get(layout.id).to_text().trim().to_string();
    if id.is_empty() {
        return Ok(None);
    }

    static EMPTY: CellValue = CellValue::Empty;
    let cell = |col: Option<usize>| col.map_or(&EMPTY, |c| raw.get(c));
    let text = |col: Option<usize>| cell(col).to_text().trim().to_string();
    let required = |col: usize| {
        let value = raw.get(col).to_text().trim().to_string();
        if value.is_empty() {
            options.missing_text.clone()
        } else {
            value
        }
    };

    let material_number = text(layout.material_number);
    let material_date = DateField::from_cell(cell(layout.material_date));
    let material = match layout.material_mode {
        MaterialMode::AlwaysRegistry => MaterialEntry::Registry,
        MaterialMode::Detect => MaterialEntry::detect(&material_number, &material_date.text)?,
    };

    let next_work = text(layout.next_work);

    Ok(Some(NormalizedRecord {
        id,
        row: raw.row,
        act_number: required(layout.act_number),
        work_name: required(layout.work_name),
        code: required(layout.code),
        start_date: DateField::from_cell(cell(layout.start_date)),
        end_date: DateField::from_cell(cell(layout.end_date)),
        material_date,
        lab_date: DateField::from_cell(cell(layout.lab_date)),
        agreement_date: DateField::from_cell(cell(layout.agreement_date)),
        material_type: text(layout.material_type),
        material_number,
        material,
        lab_primary: text(layout.lab_primary),
        lab_secondary: text(layout.lab_secondary),
        next_work: if next_work.is_empty() {
            DEFAULT_NEXT_WORK.to_string()
        } else {
            next_work
        },
    }))
}
