//! Act flavors: the per-template layouts, wording and token vocabularies

pub mod concrete;
pub mod material_registry;
pub mod registry;
pub mod waterproofing;

use crate::assembler::{AssembledAct, standard_replacements};
use crate::normalizer::{ColumnLayout, MaterialPart, NormalizedRecord};
use crate::template::Replacements;

/// Placeholder tokens as they are typed in the act templates
pub mod tokens {
    pub const ACT_NUMBER: &str = "[№ акта]";
    pub const WORK_NAME: &str = "[Наименование работ]";
    pub const START_DATE: &str = "[Дата начала работы]";
    pub const END_DATE: &str = "[Дата окончания работы]";
    pub const CODE: &str = "[Шифр]";
    pub const APPROVAL: &str = "[Согласование]";
    pub const MATERIAL_1: &str = "[Материалы1]";
    pub const MATERIAL_2: &str = "[Материалы2]";
    pub const MATERIAL_1B: &str = "[Материалы1_1]";
    pub const MATERIAL_2B: &str = "[Материалы2_1]";
    pub const LAB_1: &str = "[Лаборатория1]";
    pub const LAB_2: &str = "[Лаборатория2]";
    pub const ACT_DATE: &str = "[Дата акта]";
    pub const NEXT_WORK: &str = "[Следующая работа]";

    /// Tokens shared by every template
    pub const STANDARD: [&str; 14] = [
        ACT_NUMBER, WORK_NAME, START_DATE, END_DATE, CODE, APPROVAL, MATERIAL_1, MATERIAL_2,
        MATERIAL_1B, MATERIAL_2B, LAB_1, LAB_2, ACT_DATE, NEXT_WORK,
    ];
}

/// Which record date a lab report is dated with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabDate {
    Start,
    Lab,
}

/// Fixed report type written before a lab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabReport {
    pub name: &'static str,
    /// Appended to the identifier, before the year
    pub suffix: &'static str,
    pub date: LabDate,
}

/// Lab narratives of a flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabReports {
    /// Single report used when the primary lab id is present
    pub primary: Option<LabReport>,
    /// Pair of reports used when only the secondary lab id is present
    pub secondary: Option<[LabReport; 2]>,
}

/// Default source and template sheet names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetNames {
    pub source: &'static str,
    pub template: &'static str,
}

/// Trait that all act flavors must implement
pub trait ActFlavor: Send + Sync {
    /// Unique flavor identifier used in configuration (e.g., "concrete")
    fn id(&self) -> &str;

    /// Human-readable flavor name
    fn name(&self) -> &str;

    /// Default sheet names of the source workbook and the template
    fn sheets(&self) -> SheetNames;

    /// Source column of every field
    fn layout(&self) -> &ColumnLayout;

    /// Whether the start date also competes for the act date
    fn effective_date_includes_start(&self) -> bool {
        false
    }

    /// Full sentence and short form of one material sub-entry; a bare
    /// "№ от" reference without a short form unless overridden
    fn describe_material(&self, _record: &NormalizedRecord, part: &MaterialPart) -> (String, String) {
        (numbered(part), String::new())
    }

    fn lab_reports(&self) -> LabReports;

    /// Every token the flavor's template may contain
    fn vocabulary(&self) -> Vec<&'static str> {
        tokens::STANDARD.to_vec()
    }

    /// Token → text table for one act; must cover `vocabulary()`
    fn replacements(&self, record: &NormalizedRecord, act: &AssembledAct) -> Replacements {
        standard_replacements(record, act)
    }
}

/// "№{number} от {date}" with absent halves left out
pub(crate) fn numbered(part: &MaterialPart) -> String {
    match (part.number.is_empty(), part.date.is_empty()) {
        (false, false) => format!("№{} от {}", part.number, part.date),
        (false, true) => format!("№{}", part.number),
        (true, false) => format!("от {}", part.date),
        (true, true) => String::new(),
    }
}
