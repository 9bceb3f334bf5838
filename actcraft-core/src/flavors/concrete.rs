//! Concrete-work acts (sheet "Бетон для АОСР", template "АОСР бетон")

use super::*;
use crate::assembler::capitalize_first;
use crate::normalizer::MaterialMode;

/// Quality document issued for every concrete mix delivery
const MIX_DOCUMENT: &str = "документ о качестве бетонной смеси заданного состава качества партии";

const STRENGTH_UZK: LabReport = LabReport {
    name: "Протокол оценки прочности бетона монолитных железобетонных конструкций",
    suffix: "-УЗК/2/1.3В",
    date: LabDate::Lab,
};

const SAMPLE_COMPRESSION: LabReport = LabReport {
    name: "Протокол испытания контрольных образцов бетона на сжатие",
    suffix: "-К/2/1.3В",
    date: LabDate::Start,
};

const PULL_OFF: LabReport = LabReport {
    name: "Протокол определения прочности бетона методом отрыва со скалыванием",
    suffix: "-ОС/2/1.3В",
    date: LabDate::Lab,
};

/// One-to-one tokens of the first template generation
pub mod legacy_tokens {
    pub const MIX_TYPE: &str = "[Тип бетонной смеси]";
    pub const MIX_NUMBER: &str = "[Смесь №]";
    pub const MIX_DATE: &str = "[Смесь Дата]";
    pub const LAB_UZK: &str = "[Лаба УЗК]";
    pub const LAB_K: &str = "[Лаба К]";
    pub const LAB_DATE: &str = "[Лаба Дата]";
    pub const AGREEMENT_DATE: &str = "[Согл Дат]";

    pub const ALL: [&str; 7] = [
        MIX_TYPE, MIX_NUMBER, MIX_DATE, LAB_UZK, LAB_K, LAB_DATE, AGREEMENT_DATE,
    ];
}

pub struct ConcreteFlavor {
    layout: ColumnLayout,
}

impl ConcreteFlavor {
    pub fn new() -> Self {
        Self {
            layout: ColumnLayout {
                id: 0,
                act_number: 1,
                work_name: 2,
                code: 13,
                start_date: Some(3),
                end_date: Some(4),
                lab_date: Some(12),
                agreement_date: Some(14),
                material_type: Some(5),
                material_number: Some(7),
                material_date: Some(9),
                lab_primary: Some(10),
                lab_secondary: Some(11),
                next_work: None,
                material_mode: MaterialMode::Detect,
            },
        }
    }
}

impl Default for ConcreteFlavor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActFlavor for ConcreteFlavor {
    fn id(&self) -> &str {
        "concrete"
    }

    fn name(&self) -> &str {
        "Concrete works"
    }

    fn sheets(&self) -> SheetNames {
        SheetNames {
            source: "Бетон для АОСР",
            template: "АОСР бетон",
        }
    }

    fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    fn describe_material(&self, record: &NormalizedRecord, part: &MaterialPart) -> (String, String) {
        let reference = numbered(part);
        if reference.is_empty() {
            return (record.material_type.clone(), String::new());
        }
        let short = format!("{} {}", capitalize_first(MIX_DOCUMENT), reference);
        let full = if record.material_type.is_empty() {
            short.clone()
        } else {
            format!("{}, {} {}", record.material_type, MIX_DOCUMENT, reference)
        };
        (full, short)
    }

    fn lab_reports(&self) -> LabReports {
        LabReports {
            primary: Some(STRENGTH_UZK),
            secondary: Some([SAMPLE_COMPRESSION, PULL_OFF]),
        }
    }

    fn vocabulary(&self) -> Vec<&'static str> {
        tokens::STANDARD
            .iter()
            .chain(legacy_tokens::ALL.iter())
            .copied()
            .collect()
    }

    fn replacements(&self, record: &NormalizedRecord, act: &AssembledAct) -> Replacements {
        let mut r = standard_replacements(record, act);
        r.insert(legacy_tokens::MIX_TYPE, record.material_type.as_str());
        r.insert(legacy_tokens::MIX_NUMBER, record.material_number.as_str());
        r.insert(legacy_tokens::MIX_DATE, record.material_date.text.as_str());
        r.insert(legacy_tokens::LAB_UZK, record.lab_primary.as_str());
        r.insert(legacy_tokens::LAB_K, record.lab_secondary.as_str());
        r.insert(legacy_tokens::LAB_DATE, record.lab_date.text.as_str());
        r.insert(legacy_tokens::AGREEMENT_DATE, record.agreement_date.text.as_str());
        r
    }
}
