use actcraft_core::writer::TemplateWorkbook;
use actcraft_core::{ActError, ActGenerator, GeneratorConfig, OutputMode, RecordStatus};
use chrono::NaiveDate;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const SOURCE_SHEET: &str = "Бетон для АОСР";
const TEMPLATE_SHEET: &str = "АОСР бетон";

// Helper to create a minimal valid XLSX file for testing.
// Each sheet is a name plus the inner XML of its <sheetData>.
fn create_mock_xlsx(
    path: &Path,
    sheets: &[(&str, String)],
    shared_strings: &[&str],
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    // 1. [Content_Types].xml
    zip.start_file("[Content_Types].xml", options)?;
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
    }
    content_types.push_str("</Types>");
    zip.write_all(content_types.as_bytes())?;

    // 2. _rels/.rels
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#.as_bytes())?;

    // 3. xl/workbook.xml
    zip.start_file("xl/workbook.xml", options)?;
    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            name,
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    zip.write_all(workbook_xml.as_bytes())?;

    // 4. xl/_rels/workbook.xml.rels
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for (i, _) in sheets.iter().enumerate() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1, i + 1
        ));
    }
    rels_xml.push_str("</Relationships>");
    zip.write_all(rels_xml.as_bytes())?;

    // 5. xl/styles.xml: style 1 is the built-in short date format
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs>
</styleSheet>"#.as_bytes())?;

    // 6. xl/sharedStrings.xml
    zip.start_file("xl/sharedStrings.xml", options)?;
    let mut ss_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
        shared_strings.len()
    );
    for text in shared_strings {
        ss_xml.push_str(&format!("<si><t>{}</t></si>", text));
    }
    ss_xml.push_str("</sst>");
    zip.write_all(ss_xml.as_bytes())?;

    // 7. sheets
    for (i, (_, sheet_data)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        let sheet_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_data
        );
        zip.write_all(sheet_xml.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

fn text(cell: &str, value: &str) -> String {
    format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, cell, value)
}

fn number(cell: &str, value: u32) -> String {
    format!(r#"<c r="{}"><v>{}</v></c>"#, cell, value)
}

/// Excel serial dates rendered with the date style
fn date(cell: &str, serial: u32) -> String {
    format!(r#"<c r="{}" s="1"><v>{}</v></c>"#, cell, serial)
}

fn shared(cell: &str, index: usize) -> String {
    format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, cell, index)
}

fn row(r: u32, cells: &[String]) -> String {
    format!(r#"<row r="{}">{}</row>"#, r, cells.concat())
}

const JULY_1: u32 = 45839;
const JULY_10: u32 = 45848;
const JULY_15: u32 = 45853;

fn create_source(path: &Path) -> anyhow::Result<()> {
    let data = [
        row(1, &[text("A1", "Реестр работ")]),
        row(2, &[text("A2", "№"), text("B2", "№ акта")]),
        // Complete record with date-typed cells
        row(
            3,
            &[
                number("A3", 1),
                text("B3", "1-Б"),
                text("C3", "Бетонирование плиты"),
                date("D3", JULY_1),
                date("E3", JULY_10),
                text("F3", "B25 W6"),
                text("H3", "123"),
                text("J3", "05.07.2025"),
                text("K3", "45"),
                date("M3", JULY_15),
                text("N3", "ШФ-1"),
            ],
        ),
        // Two material numbers but one date
        row(
            4,
            &[
                number("A4", 2),
                text("B4", "2-Б"),
                text("C4", "Бетонирование стены"),
                text("H4", "10\n11"),
                text("J4", "01.07.2025"),
            ],
        ),
        row(5, &[text("C5", "Примечание без номера")]),
        row(
            6,
            &[
                number("A6", 3),
                text("B6", "3-Б"),
                text("C6", "Бетонирование колонн"),
                text("D6", "01.07.2025"),
                text("H6", "Реестр"),
                text("L6", "7"),
                text("O6", "02.07.2025"),
            ],
        ),
    ]
    .concat();
    create_mock_xlsx(path, &[(SOURCE_SHEET, data)], &[])
}

fn create_template(path: &Path) -> anyhow::Result<()> {
    let strings = [
        "Акт № [№ акта] от [Дата акта]",
        "[Наименование работ]",
        "[Материалы1]",
        "Шифр: [Шифр]",
        "[Материалы1_1]",
        "[Лаборатория1]",
        "[Лаборатория2]",
        "[Материалы2]",
        "[Материалы2_1]",
        "[Согласование]",
        "Работы выполнены с [Дата начала работы] по [Дата окончания работы]",
        "Разрешается производство последующих работ: [Следующая работа]",
        "[Подпись]",
    ];
    let data = [
        row(1, &[shared("A1", 0)]),
        row(2, &[shared("A2", 1)]),
        row(3, &[shared("A3", 2)]),
        row(4, &[shared("A4", 3)]),
        row(5, &[shared("A5", 10)]),
        row(6, &[shared("A6", 11)]),
        row(76, &[shared("A76", 4)]),
        row(80, &[shared("A80", 5)]),
        row(81, &[shared("A81", 6)]),
        row(96, &[shared("A96", 7)]),
        row(97, &[shared("A97", 8)]),
        row(98, &[shared("A98", 5)]),
        row(99, &[shared("A99", 6)]),
        row(100, &[shared("A100", 9)]),
        row(101, &[shared("A101", 12)]),
    ]
    .concat();
    create_mock_xlsx(
        path,
        &[
            (TEMPLATE_SHEET, data),
            ("Справка", row(1, &[text("A1", "Не изменять")])),
        ],
        &strings,
    )
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: GeneratorConfig,
}

fn fixture() -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    let source = root.join("Бетон.xlsx");
    let template = root.join("Шаблон.xlsx");
    create_source(&source)?;
    create_template(&template)?;

    let config = GeneratorConfig {
        source_path: source,
        template_path: template,
        output_path: root.join("Акты"),
        ..Default::default()
    };
    Ok(Fixture {
        _dir: dir,
        root,
        config,
    })
}

fn generator(config: GeneratorConfig) -> anyhow::Result<ActGenerator> {
    Ok(ActGenerator::new(config)?.with_today(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()))
}

fn sheet_text(path: &Path, sheet: &str) -> anyhow::Result<(String, String)> {
    let workbook = TemplateWorkbook::open(path, sheet)?;
    let document = workbook.instantiate(sheet);
    Ok((document.text_values()?.join("\n"), document.sheet_xml().to_string()))
}

#[test]
fn test_per_record_generation() -> anyhow::Result<()> {
    let fx = fixture()?;
    let report = generator(fx.config.clone())?.run()?;

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.generated(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.output.as_deref(), Some(fx.config.output_path.as_path()));

    let out_dir = &fx.config.output_path;
    assert!(out_dir.join("Акт_№1.xlsx").is_file());
    assert!(out_dir.join("Акт_№3.xlsx").is_file());
    assert!(!out_dir.join("Акт_№2.xlsx").exists());

    let (text, xml) = sheet_text(&out_dir.join("Акт_№1.xlsx"), TEMPLATE_SHEET)?;
    assert!(text.contains("Акт № 1-Б от 15.07.2025"));
    assert!(text.contains("Бетонирование плиты"));
    assert!(text.contains("Шифр: ШФ-1"));
    assert!(text.contains("Работы выполнены с 01.07.2025 по 10.07.2025"));
    assert!(text.contains("Разрешается производство последующих работ: Согласно проекта"));
    assert!(text.contains(
        "B25 W6, документ о качестве бетонной смеси заданного состава качества партии №123 от 05.07.2025"
    ));
    assert!(text.contains("№45-УЗК/2/1.3В-2025 от 15.07.2025"));
    assert!(!text.contains("[№ акта]"));
    assert!(!text.contains("[Материалы1]"));
    // Unknown labels stay as written
    assert!(text.contains("[Подпись]"));

    // Empty secondary material, secondary lab and approval slots are hidden
    for r in [76, 81, 97, 99, 100] {
        assert!(
            xml.contains(&format!(r#"<row r="{}" hidden="1">"#, r)),
            "row {} should be hidden",
            r
        );
    }
    for r in [80, 98, 101] {
        assert!(xml.contains(&format!(r#"<row r="{}">"#, r)), "row {} should stay visible", r);
    }
    Ok(())
}

#[test]
fn test_registry_material_and_secondary_labs() -> anyhow::Result<()> {
    let fx = fixture()?;
    generator(fx.config.clone())?.run()?;

    let (text, xml) = sheet_text(&fx.config.output_path.join("Акт_№3.xlsx"), TEMPLATE_SHEET)?;
    assert!(text.contains("Акт № 3-Б от 02.07.2025"));
    assert!(text.contains("Материалы согласно реестру №3-Б от 02.07.2025"));
    assert!(text.contains("Реестр №3-Б от 02.07.2025"));
    assert!(text.contains("№7-К/2/1.3В-2025 от 01.07.2025"));
    assert!(text.contains("№7-ОС/2/1.3В-2025"));
    assert!(text.contains("Запись из ЖАН от 02.07.2025"));
    // Work code was empty
    assert!(text.contains("Шифр: —"));

    assert!(xml.contains(r#"<row r="80">"#));
    assert!(xml.contains(r#"<row r="81">"#));
    assert!(xml.contains(r#"<row r="100">"#));
    assert!(xml.contains(r#"<row r="76" hidden="1">"#));
    Ok(())
}

#[test]
fn test_malformed_record_is_isolated() -> anyhow::Result<()> {
    let fx = fixture()?;
    let report = generator(fx.config.clone())?.run()?;

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].record_id, "2");
    assert_eq!(failures[0].row, 4);
    assert!(failures[0].message.contains("material date"));

    let ids: Vec<_> = report.records.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    Ok(())
}

#[test]
fn test_workbook_mode() -> anyhow::Result<()> {
    let fx = fixture()?;
    let output = fx.root.join("out").join("Акты.xlsx");
    let config = GeneratorConfig {
        output_mode: OutputMode::Workbook,
        output_path: output.clone(),
        ..fx.config.clone()
    };
    let report = generator(config)?.run()?;

    assert_eq!(report.generated(), 2);
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    assert!(output.is_file());

    let workbook = TemplateWorkbook::open(&output, "Акт №1")?;
    assert_eq!(workbook.sheet_names(), ["Акт №1", "Акт №3", "Справка"]);

    let (text, _) = sheet_text(&output, "Акт №3")?;
    assert!(text.contains("Бетонирование колонн"));
    assert!(text.contains("Запись из ЖАН от 02.07.2025"));

    let (text, _) = sheet_text(&output, "Справка")?;
    assert_eq!(text, "Не изменять");
    Ok(())
}

#[test]
fn test_file_name_pattern_with_subdirectories() -> anyhow::Result<()> {
    let fx = fixture()?;
    let config = GeneratorConfig {
        file_name_pattern: "{id}/Акт_№{id}.xlsx".to_string(),
        ..fx.config.clone()
    };
    let report = generator(config)?.run()?;

    assert_eq!(report.generated(), 2);
    assert!(fx.config.output_path.join("1").join("Акт_№1.xlsx").is_file());
    assert!(fx.config.output_path.join("3").join("Акт_№3.xlsx").is_file());
    Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> anyhow::Result<()> {
    let fx = fixture()?;
    let config = GeneratorConfig {
        dry_run: true,
        ..fx.config.clone()
    };
    let report = generator(config)?.run()?;

    assert_eq!(report.count(RecordStatus::Planned), 2);
    assert_eq!(report.generated(), 0);
    assert_eq!(report.failed(), 1);
    assert!(report.output.is_none());
    assert!(!fx.config.output_path.exists());
    Ok(())
}

#[test]
fn test_missing_input_is_fatal() -> anyhow::Result<()> {
    let fx = fixture()?;
    let config = GeneratorConfig {
        template_path: fx.root.join("нет.xlsx"),
        ..fx.config.clone()
    };
    let err = generator(config)?.run().unwrap_err();

    match err.downcast_ref::<ActError>() {
        Some(ActError::MissingInputFile { path, .. }) => {
            assert_eq!(path, &fx.root.join("нет.xlsx"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!fx.config.output_path.exists());
    Ok(())
}

#[test]
fn test_missing_template_sheet_is_fatal() -> anyhow::Result<()> {
    let fx = fixture()?;
    let mut config = fx.config.clone();
    config.sheets.template = Some("Нет такого листа".to_string());

    assert!(generator(config)?.run().is_err());
    Ok(())
}

#[test]
fn test_unknown_flavor_is_rejected() {
    let config = GeneratorConfig {
        flavor: "asphalt".to_string(),
        ..Default::default()
    };
    assert!(ActGenerator::new(config).is_err());
}
