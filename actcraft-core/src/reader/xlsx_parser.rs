//! XML parsing utilities for extracting row data from XLSX files

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{BTreeMap, HashMap};
use std::io::BufReader;
use zip::ZipArchive;

use super::parser_utils::{is_date_format, parse_cell_ref, read_text_node, serial_to_datetime};
use super::{CellValue, RawRecord, RowReader};

/// Resolve sheet name to its XML path in the XLSX archive
pub fn get_xlsx_sheet_path(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    sheet_name: &str,
) -> Result<String> {
    // 1. Get rId from xl/workbook.xml
    let mut rid = String::new();
    {
        let workbook_xml = archive
            .by_name("xl/workbook.xml")
            .context("Failed to find xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    if e.name().as_ref() == b"sheet" {
                        let mut name = String::new();
                        let mut r_id = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => name = attr.unescape_value()?.to_string(),
                                b"r:id" => r_id = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        if name == sheet_name {
                            rid = r_id;
                            break;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
    }

    if rid.is_empty() {
        return Err(anyhow::anyhow!(
            "Sheet '{}' not found in workbook.xml",
            sheet_name
        ));
    }

    // 2. Resolve rId in xl/_rels/workbook.xml.rels
    let mut target = String::new();
    {
        let rels_xml = archive
            .by_name("xl/_rels/workbook.xml.rels")
            .context("Failed to find xl/_rels/workbook.xml.rels")?;
        let mut reader = Reader::from_reader(BufReader::new(rels_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    if e.name().as_ref() == b"Relationship" {
                        let mut id = String::new();
                        let mut t = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"Id" => id = attr.unescape_value()?.to_string(),
                                b"Target" => t = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        if id == rid {
                            target = t;
                            break;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
    }

    if target.is_empty() {
        return Err(anyhow::anyhow!(
            "Relationship '{}' not found for sheet '{}'",
            rid,
            sheet_name
        ));
    }

    // Target is usually "worksheets/sheet1.xml" relative to xl/, sometimes absolute
    if let Some(absolute) = target.strip_prefix('/') {
        Ok(absolute.to_string())
    } else if target.starts_with("xl/") {
        Ok(target)
    } else {
        Ok(format!("xl/{}", target))
    }
}

/// Check whether the workbook uses the 1904 date system
pub fn uses_date1904(archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>) -> Result<bool> {
    let workbook_xml = archive
        .by_name("xl/workbook.xml")
        .context("Failed to find xl/workbook.xml")?;
    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"workbookPr" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"date1904" {
                        let value = attr.unescape_value()?;
                        return Ok(value == "1" || value == "true");
                    }
                }
                return Ok(false);
            }
            Event::Start(e) if e.name().as_ref() == b"sheets" => return Ok(false),
            Event::Eof => return Ok(false),
            _ => {}
        }
        buf.clear();
    }
}

pub struct XlsxReader<'a, R: std::io::Read + std::io::Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
    styles: Vec<String>,
    date1904: bool,
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Result<Self> {
        let shared_strings = extract_shared_strings(archive)?;
        let styles = parse_styles(archive).unwrap_or_default();
        let date1904 = uses_date1904(archive)?;
        Ok(Self {
            archive,
            shared_strings,
            styles,
            date1904,
        })
    }
}

impl<'a, R: std::io::Read + std::io::Seek> RowReader for XlsxReader<'a, R> {
    fn read_rows(&mut self, sheet_name: &str, start_row: u32) -> Result<Vec<RawRecord>> {
        let path = get_xlsx_sheet_path(self.archive, sheet_name)?;
        let rows = self.parse_sheet_xml(&path)?;

        Ok(rows
            .into_iter()
            .filter(|(row, _)| *row >= start_row)
            .map(|(row, cells)| {
                let width = cells.keys().next_back().map(|c| *c as usize + 1).unwrap_or(0);
                let mut values = vec![CellValue::Empty; width];
                for (col, value) in cells {
                    values[col as usize] = value;
                }
                RawRecord::new(row, values)
            })
            .collect())
    }
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    /// Parse sheet cells grouped by 1-based row number, then 0-based column
    fn parse_sheet_xml(&mut self, path: &str) -> Result<BTreeMap<u32, BTreeMap<u32, CellValue>>> {
        let mut rows: BTreeMap<u32, BTreeMap<u32, CellValue>> = BTreeMap::new();

        let sheet_xml = self
            .archive
            .by_name(path)
            .with_context(|| format!("Failed to find {}", path))?;
        let mut reader = Reader::from_reader(BufReader::new(sheet_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut current_row = 0u32;
        let mut current_col = 0u32;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.name().as_ref() == b"row" => {
                    current_row += 1;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"r" {
                            current_row = attr.unescape_value()?.parse::<u32>()?;
                        }
                    }
                    current_col = 0;
                }
                Event::Empty(e) if e.name().as_ref() == b"row" => {
                    current_row += 1;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"r" {
                            current_row = attr.unescape_value()?.parse::<u32>()?;
                        }
                    }
                    current_col = 0;
                }
                Event::Start(e) if e.name().as_ref() == b"c" => {
                    let mut r_attr = String::new();
                    let mut s_attr = None;
                    let mut t_attr = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => r_attr = attr.unescape_value()?.to_string(),
                            b"s" => s_attr = Some(attr.unescape_value()?.parse::<usize>()?),
                            b"t" => t_attr = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }

                    let (row, col) = if !r_attr.is_empty() {
                        let (r, c) = parse_cell_ref(&r_attr)
                            .map(|(r, c)| (r + 1, c))
                            .unwrap_or((current_row, current_col));
                        current_col = c + 1;
                        (r, c)
                    } else {
                        let c = current_col;
                        current_col += 1;
                        (current_row, c)
                    };

                    let num_fmt = s_attr.and_then(|idx| self.styles.get(idx)).map(String::as_str);
                    let value = parse_cell_contents(
                        &mut reader,
                        &t_attr,
                        &self.shared_strings,
                        num_fmt,
                        self.date1904,
                    )?;

                    if !value.is_empty() {
                        rows.entry(row).or_default().insert(col, value);
                    }
                }
                Event::Empty(e) if e.name().as_ref() == b"c" => {
                    // Styled but valueless cell
                    current_col += 1;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"r"
                            && let Some((_, c)) = parse_cell_ref(&attr.unescape_value()?)
                        {
                            current_col = c + 1;
                        }
                    }
                }
                Event::End(e) if e.name().as_ref() == b"sheetData" => break,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(rows)
    }
}

fn parse_cell_contents<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    t_attr: &str,
    shared_strings: &[String],
    num_fmt: Option<&str>,
    date1904: bool,
) -> Result<CellValue> {
    let mut value = CellValue::Empty;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"v" => {
                    let v_text = read_text_node(reader)?;
                    value = match t_attr {
                        "s" => {
                            let idx = v_text.trim().parse::<usize>().unwrap_or(0);
                            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
                        }
                        "b" => CellValue::Boolean(v_text == "1"),
                        // Cached error of a formula; nothing usable for an act
                        "e" => CellValue::Empty,
                        "str" | "inlineStr" => CellValue::Text(v_text),
                        "d" => parse_iso_datetime(&v_text)
                            .map(CellValue::DateTime)
                            .unwrap_or(CellValue::Text(v_text)),
                        _ => {
                            // In XLSX, text format is indicated by num_fmt == "@"
                            if num_fmt == Some("@") {
                                CellValue::Text(v_text)
                            } else if let Ok(n) = v_text.trim().parse::<f64>() {
                                match num_fmt {
                                    Some(fmt) if is_date_format(fmt) => {
                                        serial_to_datetime(n, date1904)
                                            .map(CellValue::DateTime)
                                            .unwrap_or(CellValue::Number(n))
                                    }
                                    _ => CellValue::Number(n),
                                }
                            } else {
                                CellValue::Text(v_text)
                            }
                        }
                    };
                }
                b"is" => {
                    // Inline string can have multiple <t> tags
                    let mut is_text = String::new();
                    let mut is_buf = Vec::new();
                    loop {
                        match reader.read_event_into(&mut is_buf)? {
                            Event::Start(ref ee) if ee.name().as_ref() == b"t" => {
                                is_text.push_str(&read_text_node(reader)?);
                            }
                            Event::Start(ref ee) if ee.name().as_ref() == b"rPh" => {
                                // Phonetic hints are not part of the value
                                reader.read_to_end_into(ee.name(), &mut Vec::new())?;
                            }
                            Event::End(ref ee) if ee.name().as_ref() == b"is" => break,
                            Event::Eof => break,
                            _ => {}
                        }
                        is_buf.clear();
                    }
                    value = CellValue::Text(is_text);
                }
                _ => {}
            },
            Event::End(ref e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(value)
}

fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Extract the plain text of every shared string item
pub fn extract_shared_strings(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_string = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"t" => {
                current_string.push_str(&read_text_node(&mut reader)?);
            }
            Event::Start(e) if e.name().as_ref() == b"rPh" => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::Empty(e) if e.name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current_string));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Map every cellXfs style index to its number format code
pub fn parse_styles(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<String>> {
    let mut num_fmts: HashMap<u32, String> = HashMap::new();

    // Built-in formats (simplified subset)
    num_fmts.insert(0, "General".to_string());
    num_fmts.insert(1, "0".to_string());
    num_fmts.insert(2, "0.00".to_string());
    num_fmts.insert(3, "#,##0".to_string());
    num_fmts.insert(4, "#,##0.00".to_string());
    num_fmts.insert(9, "0%".to_string());
    num_fmts.insert(10, "0.00%".to_string());
    num_fmts.insert(11, "0.00E+00".to_string());
    num_fmts.insert(12, "# ?/?".to_string());
    num_fmts.insert(13, "# ??/??".to_string());
    num_fmts.insert(14, "mm-dd-yy".to_string());
    num_fmts.insert(15, "d-mmm-yy".to_string());
    num_fmts.insert(16, "d-mmm".to_string());
    num_fmts.insert(17, "mmm-yy".to_string());
    num_fmts.insert(18, "h:mm AM/PM".to_string());
    num_fmts.insert(19, "h:mm:ss AM/PM".to_string());
    num_fmts.insert(20, "h:mm".to_string());
    num_fmts.insert(21, "h:mm:ss".to_string());
    num_fmts.insert(22, "m/d/yy h:mm".to_string());
    num_fmts.insert(45, "mm:ss".to_string());
    num_fmts.insert(46, "[h]:mm:ss".to_string());
    num_fmts.insert(47, "mmss.0".to_string());
    num_fmts.insert(49, "@".to_string());

    let styles_xml = match archive.by_name("xl/styles.xml") {
        Ok(file) => file,
        Err(_) => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_reader(BufReader::new(styles_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut xfs = Vec::new();
    let mut xf_ids = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"numFmt" => {
                    let mut id = None;
                    let mut code = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                            b"formatCode" => code = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    if let Some(id) = id
                        && !code.is_empty()
                    {
                        num_fmts.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let mut num_fmt_id = 0u32;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"numFmtId"
                            && let Ok(val) = attr.unescape_value()?.parse::<u32>()
                        {
                            num_fmt_id = val;
                        }
                    }
                    xf_ids.push(num_fmt_id);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // numFmts precede cellXfs in styles.xml, but resolve late to be safe
    for id in xf_ids {
        let format_code = num_fmts
            .get(&id)
            .cloned()
            .unwrap_or_else(|| builtin_locale_format(id).to_string());
        xfs.push(format_code);
    }

    Ok(xfs)
}

/// Locale-dependent built-in formats that only appear as ids
fn builtin_locale_format(id: u32) -> &'static str {
    match id {
        // Date formats reserved for East Asian and localized builds
        27..=36 | 50..=58 => "yyyy-mm-dd",
        _ => "General",
    }
}
