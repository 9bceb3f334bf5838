//! Waterproofing acts (sheet "ГИ для АОСР", template "АОСР ГИ")

use super::*;
use crate::assembler::capitalize_phrase;
use crate::normalizer::MaterialMode;

const MOISTURE: LabReport = LabReport {
    name: "Протокол определения фактической влажности бетонного основания при устройстве гидроизоляции",
    suffix: "-ВЛ/2/1.3В",
    date: LabDate::Start,
};

const ADHESION: LabReport = LabReport {
    name: "Протокол определения адгезии гидроизоляционного покрытия",
    suffix: "-А/2/1.3В",
    date: LabDate::Lab,
};

pub struct WaterproofingFlavor {
    layout: ColumnLayout,
}

impl WaterproofingFlavor {
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
                material_type: None,
                material_number: Some(7),
                material_date: Some(8),
                lab_primary: None,
                lab_secondary: Some(11),
                next_work: Some(5),
                material_mode: MaterialMode::Detect,
            },
        }
    }
}

impl Default for WaterproofingFlavor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActFlavor for WaterproofingFlavor {
    fn id(&self) -> &str {
        "waterproofing"
    }

    fn name(&self) -> &str {
        "Waterproofing works"
    }

    fn sheets(&self) -> SheetNames {
        SheetNames {
            source: "ГИ для АОСР",
            template: "АОСР ГИ",
        }
    }

    fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Material name followed by its document; the short form is the document alone, in sentence case
    fn describe_material(&self, _record: &NormalizedRecord, part: &MaterialPart) -> (String, String) {
        let full = [part.number.as_str(), part.date.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" - ");
        (full, capitalize_phrase(&part.date))
    }

    fn lab_reports(&self) -> LabReports {
        LabReports {
            primary: None,
            secondary: Some([MOISTURE, ADHESION]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblyContext, HiddenRowMap, assemble};
    use crate::normalizer::{MaterialEntry, NormalizeOptions, normalize};
    use crate::reader::{CellValue, RawRecord};
    use crate::template::remaining_tokens;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::DateTime(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn record(cells: Vec<(usize, CellValue)>) -> NormalizedRecord {
        let mut values = vec![CellValue::Empty; 15];
        for (col, value) in cells {
            values[col] = value;
        }
        normalize(
            &RawRecord::new(5, values),
            WaterproofingFlavor::new().layout(),
            &NormalizeOptions::default(),
        )
        .unwrap()
        .unwrap()
    }

    fn ctx() -> AssemblyContext {
        AssemblyContext::new(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap())
    }

    #[test]
    fn test_two_materials_and_labs() {
        let record = record(vec![
            (0, CellValue::Number(7.0)),
            (1, CellValue::Number(21.0)),
            (2, text("Устройство гидроизоляции фундаментной плиты")),
            (3, date(2025, 6, 1)),
            (4, date(2025, 7, 15)),
            (5, text("Устройство защитной стяжки")),
            (7, text("Мастика битумная\nПраймер")),
            (8, text("сертификат №11 от 01.05.2025\nпаспорт №4 от 03.05.2025")),
            (11, text("12")),
            (12, date(2025, 6, 20)),
            (13, text("1.3В-ГИ")),
        ]);
        let flavor = WaterproofingFlavor::new();
        let act = assemble(&flavor, &record, &ctx(), &HiddenRowMap::standard());

        assert!(record.material.is_multi_value());
        assert_eq!(act.material_text_1, "Мастика битумная - сертификат №11 от 01.05.2025");
        assert_eq!(act.material_text_1b, "Праймер - паспорт №4 от 03.05.2025");
        assert_eq!(act.material_text_2, "Сертификат №11 от 01.05.2025");
        assert_eq!(act.material_text_2b, "Паспорт №4 от 03.05.2025");
        assert_eq!(
            act.lab_text_1,
            "Протокол определения фактической влажности бетонного основания при устройстве гидроизоляции №12-ВЛ/2/1.3В-2025 от 01.06.2025"
        );
        assert_eq!(
            act.lab_text_2,
            "Протокол определения адгезии гидроизоляционного покрытия №12-А/2/1.3В-2025 от 20.06.2025"
        );
        assert_eq!(act.hidden_rows.iter().copied().collect::<Vec<_>>(), vec![100]);
        assert_eq!(
            act.replacements.get("[Следующая работа]"),
            Some("Устройство защитной стяжки")
        );
        assert_eq!(act.replacements.get("[№ акта]"), Some("21"));

        let sheet_text: String = flavor.vocabulary().join(" ");
        let rendered = act.replacements.apply(&sheet_text).into_owned();
        assert!(remaining_tokens(&rendered, flavor.vocabulary()).is_empty());
    }

    #[test]
    fn test_single_material_with_wrapped_certificate() {
        let record = record(vec![
            (0, text("10")),
            (1, text("23")),
            (4, date(2025, 7, 1)),
            (7, text("Мастика битумная")),
            (8, text("паспорт ООО ТехноНИКОЛЬ\n№4 от 03.05.2025")),
        ]);
        let act = assemble(&WaterproofingFlavor::new(), &record, &ctx(), &HiddenRowMap::standard());

        assert!(!record.material.is_multi_value());
        assert_eq!(
            act.material_text_1,
            "Мастика битумная - паспорт ООО ТехноНИКОЛЬ\n№4 от 03.05.2025"
        );
        assert_eq!(act.material_text_2, "Паспорт ооо технониколь\n№4 от 03.05.2025");
        assert_eq!(act.material_text_1b, "");
        assert!(act.hidden_rows.contains(&76));
        assert!(act.hidden_rows.contains(&97));
    }

    #[test]
    fn test_registry_sentinel() {
        let record = record(vec![
            (0, text("8")),
            (1, text("22")),
            (4, date(2025, 6, 1)),
            (7, text("Реестр")),
            (14, date(2025, 7, 15)),
        ]);
        let act = assemble(&WaterproofingFlavor::new(), &record, &ctx(), &HiddenRowMap::standard());

        assert_eq!(record.material, MaterialEntry::Registry);
        assert_eq!(act.material_text_1, "Материалы согласно реестру №22 от 15.07.2025");
        assert_eq!(act.material_text_2, "Реестр №22 от 15.07.2025");
        assert_eq!(act.material_text_1b, "");
        assert_eq!(act.material_text_2b, "");
        assert_eq!(
            act.hidden_rows.iter().copied().collect::<Vec<_>>(),
            vec![76, 80, 81, 97, 98, 99]
        );
    }

    #[test]
    fn test_fixed_report_year() {
        let record = record(vec![(0, text("9")), (11, text("3")), (12, date(2025, 12, 30))]);
        let mut ctx = ctx();
        ctx.report_year = Some(2026);
        let act = assemble(&WaterproofingFlavor::new(), &record, &ctx, &HiddenRowMap::standard());
        assert!(act.lab_text_2.contains("№3-А/2/1.3В-2026 от 30.12.2025"));
    }
}
