//! Act assembly: derived texts, replacement table and hidden template rows

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::flavors::{ActFlavor, LabDate, LabReport, tokens};
use crate::normalizer::{DATE_FORMAT, MaterialEntry, NormalizedRecord};
use crate::template::Replacements;

/// Inputs of assembly that do not come from the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyContext {
    /// Fallback effective date when a record has no usable date
    pub today: NaiveDate,
    /// Year written into lab report numbers; the effective date's year when `None`
    pub report_year: Option<i32>,
}

impl AssemblyContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            report_year: None,
        }
    }
}

/// Template rows (1-based) to hide when an optional text slot ends up empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenRowMap {
    pub secondary_material: Vec<u32>,
    pub secondary_material_short: Vec<u32>,
    pub primary_lab: Vec<u32>,
    pub secondary_lab: Vec<u32>,
    pub approval: Vec<u32>,
}

impl HiddenRowMap {
    /// Row layout shared by the act templates
    pub fn standard() -> Self {
        Self {
            secondary_material: vec![76],
            secondary_material_short: vec![97],
            primary_lab: vec![80, 98],
            secondary_lab: vec![81, 99],
            approval: vec![100],
        }
    }
}

impl Default for HiddenRowMap {
    fn default() -> Self {
        Self::standard()
    }
}

/// Everything derived from one normalized record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledAct {
    pub effective_date: NaiveDate,
    pub approval_note: String,
    pub material_text_1: String,
    pub material_text_1b: String,
    pub material_text_2: String,
    pub material_text_2b: String,
    pub lab_text_1: String,
    pub lab_text_2: String,
    pub hidden_rows: BTreeSet<u32>,
    pub replacements: Replacements,
}

impl AssembledAct {
    pub fn effective_date_text(&self) -> String {
        self.effective_date.format(DATE_FORMAT).to_string()
    }
}

/// Latest calendar date among the candidates, or `today` when there is none
pub fn effective_date<'a>(
    candidates: impl IntoIterator<Item = &'a Option<NaiveDate>>,
    today: NaiveDate,
) -> NaiveDate {
    candidates
        .into_iter()
        .filter_map(|d| *d)
        .max()
        .unwrap_or(today)
}

/// "Запись из ЖАН" note for a non-empty agreement date
pub fn approval_note(agreement_date: &str) -> String {
    if agreement_date.is_empty() {
        String::new()
    } else {
        format!("Запись из ЖАН от {}", agreement_date)
    }
}

/// Upper-case the first character, keep the rest as written
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sentence case: upper-case the first character, lower-case the rest
pub fn capitalize_phrase(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Material texts: full sentence and short form, primary and secondary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialTexts {
    pub full: String,
    pub full_secondary: String,
    pub short: String,
    pub short_secondary: String,
}

fn material_texts(
    flavor: &dyn ActFlavor,
    record: &NormalizedRecord,
    effective_date: &str,
) -> MaterialTexts {
    match &record.material {
        MaterialEntry::Registry => MaterialTexts {
            full: format!(
                "Материалы согласно реестру №{} от {}",
                record.act_number, effective_date
            ),
            short: format!("Реестр №{} от {}", record.act_number, effective_date),
            ..Default::default()
        },
        MaterialEntry::MultiValue([first, second]) => {
            let (full, short) = flavor.describe_material(record, first);
            let (full_secondary, short_secondary) = flavor.describe_material(record, second);
            MaterialTexts {
                full,
                full_secondary,
                short,
                short_secondary,
            }
        }
        MaterialEntry::Single(part) => {
            let (full, short) = flavor.describe_material(record, part);
            MaterialTexts {
                full,
                short,
                ..Default::default()
            }
        }
    }
}

fn lab_sentence(report: &LabReport, lab_id: &str, year: i32, record: &NormalizedRecord) -> String {
    let date = match report.date {
        LabDate::Start => &record.start_date.text,
        LabDate::Lab => &record.lab_date.text,
    };
    format!(
        "{} №{}{}-{} от {}",
        report.name, lab_id, report.suffix, year, date
    )
}

fn lab_texts(flavor: &dyn ActFlavor, record: &NormalizedRecord, year: i32) -> (String, String) {
    let reports = flavor.lab_reports();
    if !record.lab_primary.is_empty()
        && let Some(primary) = &reports.primary
    {
        return (
            lab_sentence(primary, &record.lab_primary, year, record),
            String::new(),
        );
    }
    if !record.lab_secondary.is_empty()
        && let Some([first, second]) = &reports.secondary
    {
        return (
            lab_sentence(first, &record.lab_secondary, year, record),
            lab_sentence(second, &record.lab_secondary, year, record),
        );
    }
    (String::new(), String::new())
}

/// Rows to hide, decided only by which optional slots are empty
pub fn hidden_rows(
    map: &HiddenRowMap,
    material: &MaterialTexts,
    lab_text_1: &str,
    lab_text_2: &str,
    approval_note: &str,
) -> BTreeSet<u32> {
    let mut rows = BTreeSet::new();
    let slots = [
        (material.full_secondary.is_empty(), &map.secondary_material),
        (material.short_secondary.is_empty(), &map.secondary_material_short),
        (lab_text_1.is_empty(), &map.primary_lab),
        (lab_text_2.is_empty(), &map.secondary_lab),
        (approval_note.is_empty(), &map.approval),
    ];
    for (empty, slot_rows) in slots {
        if empty {
            rows.extend(slot_rows.iter().copied());
        }
    }
    rows
}

/// Derive the act of one record
pub fn assemble(
    flavor: &dyn ActFlavor,
    record: &NormalizedRecord,
    ctx: &AssemblyContext,
    hidden_map: &HiddenRowMap,
) -> AssembledAct {
    let mut candidates = vec![
        record.end_date.date,
        record.lab_date.date,
        record.agreement_date.date,
    ];
    if flavor.effective_date_includes_start() {
        candidates.push(record.start_date.date);
    }
    let effective = effective_date(&candidates, ctx.today);
    let effective_text = effective.format(DATE_FORMAT).to_string();

    let approval = approval_note(&record.agreement_date.text);
    let material = material_texts(flavor, record, &effective_text);
    let year = ctx.report_year.unwrap_or_else(|| effective.year());
    let (lab_text_1, lab_text_2) = lab_texts(flavor, record, year);
    let hidden = hidden_rows(hidden_map, &material, &lab_text_1, &lab_text_2, &approval);

    let mut act = AssembledAct {
        effective_date: effective,
        approval_note: approval,
        material_text_1: material.full,
        material_text_1b: material.full_secondary,
        material_text_2: material.short,
        material_text_2b: material.short_secondary,
        lab_text_1,
        lab_text_2,
        hidden_rows: hidden,
        replacements: Replacements::new(),
    };
    act.replacements = flavor.replacements(record, &act);
    act
}

/// Replacement table for the tokens every act template shares
pub fn standard_replacements(record: &NormalizedRecord, act: &AssembledAct) -> Replacements {
    let mut r = Replacements::new();
    r.insert(tokens::ACT_NUMBER, record.act_number.as_str());
    r.insert(tokens::WORK_NAME, record.work_name.as_str());
    r.insert(tokens::START_DATE, record.start_date.text.as_str());
    r.insert(tokens::END_DATE, record.end_date.text.as_str());
    r.insert(tokens::CODE, record.code.as_str());
    r.insert(tokens::APPROVAL, act.approval_note.as_str());
    r.insert(tokens::MATERIAL_1, act.material_text_1.as_str());
    r.insert(tokens::MATERIAL_2, act.material_text_2.as_str());
    r.insert(tokens::MATERIAL_1B, act.material_text_1b.as_str());
    r.insert(tokens::MATERIAL_2B, act.material_text_2b.as_str());
    r.insert(tokens::LAB_1, act.lab_text_1.as_str());
    r.insert(tokens::LAB_2, act.lab_text_2.as_str());
    r.insert(tokens::ACT_DATE, act.effective_date_text());
    r.insert(tokens::NEXT_WORK, record.next_work.as_str());
    r
}
