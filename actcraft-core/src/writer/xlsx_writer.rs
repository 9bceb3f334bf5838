//! XLSX template instantiation: cell substitution, row hiding and package rewriting

use anyhow::{Context, Result};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, Cursor, Read, Write};
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::reader::parser_utils::read_text_node;
use crate::reader::xlsx_parser::get_xlsx_sheet_path;
use crate::template::{Replacements, bracket_labels, remaining_tokens};

const WORKBOOK_XML: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const CALC_CHAIN: &str = "xl/calcChain.xml";

const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// One formatted run of a rich text value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichRun {
    /// Raw `<rPr>` element, `None` for an unformatted run
    pub properties: Option<String>,
    pub text: String,
}

/// Text of a shared or inline string, split in runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    pub runs: Vec<RichRun>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            runs: vec![RichRun {
                properties: None,
                text: text.into(),
            }],
        }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Substituted copy, or `None` when no token occurs.
    ///
    /// Runs keep their formatting when every token lies inside one run;
    /// otherwise the text collapses into a single run styled like the first.
    pub fn substitute(&self, replacements: &Replacements) -> Option<RichText> {
        let full = self.text();
        if !replacements.matches(&full) {
            return None;
        }
        let expected = replacements.apply(&full).into_owned();

        let per_run: Vec<RichRun> = self
            .runs
            .iter()
            .map(|run| RichRun {
                properties: run.properties.clone(),
                text: replacements.apply(&run.text).into_owned(),
            })
            .collect();
        let joined: String = per_run.iter().map(|r| r.text.as_str()).collect();
        if joined == expected {
            return Some(RichText { runs: per_run });
        }

        Some(RichText {
            runs: vec![RichRun {
                properties: self.runs.first().and_then(|r| r.properties.clone()),
                text: expected,
            }],
        })
    }
}

/// Name, id and relationship of a `<sheet>` entry of workbook.xml
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    rid: String,
}

/// Template workbook loaded once per run
#[derive(Debug)]
pub struct TemplateWorkbook {
    path: PathBuf,
    bytes: Vec<u8>,
    sheet_name: String,
    sheet_path: String,
    sheet_xml: String,
    sheet_names: Vec<String>,
    shared_strings: Vec<RichText>,
}

impl TemplateWorkbook {
    /// Load the template package and locate `sheet_name` in it
    pub fn open<P: AsRef<Path>>(path: P, sheet_name: &str) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

        let (sheet_path, sheet_xml, sheet_names, shared_strings) = {
            let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))
                .context("Failed to open zip archive")?;
            let sheet_path = get_xlsx_sheet_path(&mut archive, sheet_name)?;
            let sheet_xml = read_zip_entry(&mut archive, &sheet_path)?;
            let sheet_names = parse_sheet_entries(&read_zip_entry(&mut archive, WORKBOOK_XML)?)?
                .into_iter()
                .map(|entry| entry.name)
                .collect();
            let shared_strings = if archive.by_name(SHARED_STRINGS).is_ok() {
                parse_shared_strings(&read_zip_entry(&mut archive, SHARED_STRINGS)?)?
            } else {
                Vec::new()
            };
            (sheet_path, sheet_xml, sheet_names, shared_strings)
        };

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            sheet_name: sheet_name.to_string(),
            sheet_path,
            sheet_xml,
            sheet_names,
            shared_strings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Names of every sheet in the template package
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Bracket-delimited labels found in the template sheet
    pub fn placeholders(&self) -> Result<BTreeSet<String>> {
        let texts = cell_texts(&self.sheet_xml, &self.shared_strings)?;
        Ok(texts
            .iter()
            .flat_map(|text| bracket_labels(text))
            .map(str::to_string)
            .collect())
    }

    /// Editable copy of the template sheet
    pub fn instantiate(&self, sheet_name: impl Into<String>) -> ActDocument<'_> {
        ActDocument {
            template: self,
            name: sheet_name.into(),
            sheet_xml: self.sheet_xml.clone(),
        }
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(self.bytes.as_slice())).context("Failed to open zip archive")
    }

    /// Copy of the template package with the template sheet replaced by `sheet_xml`
    pub fn write_single(&self, output_path: &Path, sheet_xml: &str) -> Result<()> {
        let mut archive = self.archive()?;
        let output_file = File::create(output_path)?;
        let mut zip_writer = ZipWriter::new(output_file);
        let options = SimpleFileOptions::default();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if file.is_dir() {
                zip_writer.add_directory(name.as_str(), options)?;
                continue;
            }

            zip_writer.start_file(name.as_str(), options)?;
            if name == self.sheet_path {
                zip_writer.write_all(sheet_xml.as_bytes())?;
            } else {
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                zip_writer.write_all(&buffer)?;
            }
        }

        zip_writer.finish()?;
        Ok(())
    }

    /// Copy of the template package where the template sheet is replaced by
    /// one sheet per `(name, xml)` pair, in order
    pub fn write_aggregate(&self, output_path: &Path, sheets: &[(String, String)]) -> Result<()> {
        if sheets.is_empty() {
            anyhow::bail!("No sheets to write");
        }

        let mut archive = self.archive()?;
        let workbook_xml = read_zip_entry(&mut archive, WORKBOOK_XML)?;
        let entries = parse_sheet_entries(&workbook_xml)?;
        let template_index = entries
            .iter()
            .position(|entry| entry.name == self.sheet_name)
            .with_context(|| format!("Sheet '{}' not found in workbook.xml", self.sheet_name))?;
        let template_rid = entries[template_index].rid.clone();
        let next_sheet_id = entries.iter().map(|e| e.sheet_id).max().unwrap_or(0) + 1;

        let new_sheets: Vec<NewSheet> = sheets
            .iter()
            .enumerate()
            .map(|(k, (name, _))| NewSheet {
                name: name.clone(),
                sheet_id: next_sheet_id + k as u32,
                rid: format!("rIdAct{}", k + 1),
                part: format!("xl/worksheets/act{}.xml", k + 1),
            })
            .collect();

        let template_rels = sheet_rels_path(&self.sheet_path);
        let removed_parts = [format!("/{}", self.sheet_path), format!("/{}", CALC_CHAIN)];
        let added_parts: Vec<String> = new_sheets.iter().map(|s| format!("/{}", s.part)).collect();

        let output_file = File::create(output_path)?;
        let mut zip_writer = ZipWriter::new(output_file);
        let options = SimpleFileOptions::default();
        let mut sheet_rels: Option<Vec<u8>> = None;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if file.is_dir() {
                zip_writer.add_directory(name.as_str(), options)?;
                continue;
            }
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;

            if name == self.sheet_path || name == CALC_CHAIN {
                continue;
            }
            if name == template_rels {
                sheet_rels = Some(buffer);
                continue;
            }

            let content = match name.as_str() {
                WORKBOOK_XML => {
                    rewrite_workbook_xml(&workbook_xml, &self.sheet_name, template_index, &new_sheets)?
                        .into_bytes()
                }
                WORKBOOK_RELS => {
                    rewrite_workbook_rels(&String::from_utf8(buffer)?, &template_rid, &new_sheets)?
                        .into_bytes()
                }
                CONTENT_TYPES => {
                    rewrite_content_types(&String::from_utf8(buffer)?, &removed_parts, &added_parts)?
                        .into_bytes()
                }
                _ => buffer,
            };
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(&content)?;
        }

        for (k, ((_, xml), sheet)) in sheets.iter().zip(&new_sheets).enumerate() {
            let xml = if k == 0 {
                Cow::Borrowed(xml.as_str())
            } else {
                Cow::Owned(clear_tab_selected(xml)?)
            };
            zip_writer.start_file(sheet.part.as_str(), options)?;
            zip_writer.write_all(xml.as_bytes())?;

            if let Some(rels) = &sheet_rels {
                zip_writer.start_file(sheet_rels_path(&sheet.part).as_str(), options)?;
                zip_writer.write_all(rels)?;
            }
        }

        zip_writer.finish()?;
        Ok(())
    }
}

/// One act: an instantiated copy of the template sheet
#[derive(Debug, Clone)]
pub struct ActDocument<'t> {
    template: &'t TemplateWorkbook,
    name: String,
    sheet_xml: String,
}

impl<'t> ActDocument<'t> {
    pub fn template(&self) -> &'t TemplateWorkbook {
        self.template
    }

    /// Sheet name used when acts are collected in one workbook
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sheet_xml(&self) -> &str {
        &self.sheet_xml
    }

    /// Substitute tokens in every text cell and hide the given 1-based rows
    pub fn substitute_and_hide(
        &mut self,
        replacements: &Replacements,
        hidden_rows: &BTreeSet<u32>,
    ) -> Result<()> {
        self.sheet_xml = render_sheet(
            &self.sheet_xml,
            &self.template.shared_strings,
            replacements,
            hidden_rows,
        )?;
        Ok(())
    }

    /// Text of every string cell, shared strings resolved
    pub fn text_values(&self) -> Result<Vec<String>> {
        cell_texts(&self.sheet_xml, &self.template.shared_strings)
    }

    /// Tokens of `vocabulary` still present in any cell
    pub fn remaining_tokens<'v>(&self, vocabulary: &[&'v str]) -> Result<Vec<&'v str>> {
        let mut found: Vec<&'v str> = Vec::new();
        for text in self.text_values()? {
            for token in remaining_tokens(&text, vocabulary.iter().copied()) {
                if !found.contains(&token) {
                    found.push(token);
                }
            }
        }
        Ok(found)
    }
}

struct NewSheet {
    name: String,
    sheet_id: u32,
    rid: String,
    part: String,
}

enum CellPart {
    Value(String),
    Inline(RichText),
    Raw(Event<'static>),
}

// Helper functions

fn read_zip_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .with_context(|| format!("Failed to find {}", name))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// "xl/worksheets/sheet1.xml" -> "xl/worksheets/_rels/sheet1.xml.rels"
fn sheet_rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn attributes_of(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        attrs.push((
            String::from_utf8(attr.key.as_ref().to_vec())?,
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(attrs)
}

/// Text node escaping only what element content requires
fn text_event(text: &str) -> Event<'_> {
    Event::Text(BytesText::from_escaped(partial_escape(text)))
}

fn element(name: &str, attrs: &[(String, String)]) -> BytesStart<'static> {
    let mut e = BytesStart::new(name.to_string());
    for (key, value) in attrs {
        e.push_attribute((key.as_str(), value.as_str()));
    }
    e
}

/// Copy of `e` with `key` set to `value` (or dropped when `value` is `None`)
fn with_attribute(e: &BytesStart, key: &str, value: Option<&str>) -> BytesStart<'static> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != key.as_bytes() {
            out.push_attribute(attr);
        }
    }
    if let Some(value) = value {
        out.push_attribute((key, value));
    }
    out
}

fn parse_sheet_entries(workbook_xml: &str) -> Result<Vec<SheetEntry>> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let mut entry = SheetEntry {
                    name: String::new(),
                    sheet_id: 0,
                    rid: String::new(),
                };
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"name" => entry.name = attr.unescape_value()?.into_owned(),
                        b"sheetId" => entry.sheet_id = attr.unescape_value()?.parse()?,
                        b"r:id" => entry.rid = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }
                sheets.push(entry);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Raw XML of the element whose start tag was just read, end tag included
fn capture_element<R: BufRead>(reader: &mut Reader<R>, start: BytesStart<'_>) -> Result<String> {
    let end_name = start.name().as_ref().to_vec();
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(start))?;

    let mut depth = 0usize;
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let done = match &event {
            Event::Start(e) if e.name().as_ref() == end_name.as_slice() => {
                depth += 1;
                false
            }
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => {
                if depth == 0 {
                    true
                } else {
                    depth -= 1;
                    false
                }
            }
            Event::Eof => anyhow::bail!(
                "Unexpected end of XML inside <{}>",
                String::from_utf8_lossy(&end_name)
            ),
            _ => false,
        };
        writer.write_event(event)?;
        if done {
            break;
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Parse the runs of an `<si>` or `<is>` element whose start tag was just read
fn parse_rich_text<R: BufRead>(reader: &mut Reader<R>, end: &[u8]) -> Result<RichText> {
    let mut rich = RichText::default();
    let mut properties: Option<String> = None;
    let mut in_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"r" => {
                in_run = true;
                properties = None;
            }
            Event::Start(e) if e.name().as_ref() == b"rPr" => {
                properties = Some(capture_element(reader, e.into_owned())?);
            }
            Event::Start(e) if e.name().as_ref() == b"t" => {
                let text = read_text_node(reader)?;
                rich.runs.push(RichRun {
                    properties: if in_run { properties.take() } else { None },
                    text,
                });
            }
            Event::Start(e) if e.name().as_ref() == b"rPh" => {
                // Phonetic hints are not part of the value
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.name().as_ref() == b"r" => in_run = false,
            Event::End(e) if e.name().as_ref() == end => break,
            Event::Eof => anyhow::bail!("Unexpected end of XML inside a string item"),
            _ => {}
        }
        buf.clear();
    }

    Ok(rich)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<RichText>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"si" => {
                strings.push(parse_rich_text(&mut reader, b"si")?);
            }
            Event::Empty(e) if e.name().as_ref() == b"si" => strings.push(RichText::default()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn write_rich_text(writer: &mut Writer<Vec<u8>>, rich: &RichText, wrapper: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(wrapper)))?;
    let plain = rich.runs.len() == 1 && rich.runs[0].properties.is_none();
    for run in &rich.runs {
        if !plain {
            writer.write_event(Event::Start(BytesStart::new("r")))?;
            if let Some(properties) = &run.properties {
                writer.get_mut().extend_from_slice(properties.as_bytes());
            }
        }
        writer.write_event(Event::Start(
            BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
        ))?;
        writer.write_event(text_event(&run.text))?;
        writer.write_event(Event::End(BytesEnd::new("t")))?;
        if !plain {
            writer.write_event(Event::End(BytesEnd::new("r")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(wrapper)))?;
    Ok(())
}

/// Children of the `<c>` element whose start tag was just read
fn read_cell<R: BufRead>(reader: &mut Reader<R>) -> Result<Vec<CellPart>> {
    let mut parts = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"v" => {
                parts.push(CellPart::Value(read_text_node(reader)?));
            }
            Event::Start(e) if e.name().as_ref() == b"is" => {
                parts.push(CellPart::Inline(parse_rich_text(reader, b"is")?));
            }
            Event::End(e) if e.name().as_ref() == b"c" => break,
            Event::Eof => anyhow::bail!("Unexpected end of sheet XML inside a cell"),
            event => parts.push(CellPart::Raw(event.into_owned())),
        }
        buf.clear();
    }
    Ok(parts)
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    start: &BytesStart,
    mut parts: Vec<CellPart>,
    shared_strings: &[RichText],
    replacements: &Replacements,
) -> Result<()> {
    let cell_type = attribute(start, b"t")?;
    let mut start = start.clone().into_owned();

    match cell_type.as_deref() {
        Some("s") => {
            let shared = parts.iter().find_map(|part| match part {
                CellPart::Value(v) => v.trim().parse::<usize>().ok(),
                _ => None,
            });
            if let Some(rich) = shared.and_then(|idx| shared_strings.get(idx))
                && let Some(substituted) = rich.substitute(replacements)
            {
                start = with_attribute(&start, "t", Some("inlineStr"));
                parts = parts
                    .into_iter()
                    .map(|part| match part {
                        CellPart::Value(_) => CellPart::Inline(substituted.clone()),
                        other => other,
                    })
                    .collect();
            }
        }
        Some("inlineStr") => {
            parts = parts
                .into_iter()
                .map(|part| match part {
                    CellPart::Inline(rich) => match rich.substitute(replacements) {
                        Some(substituted) => CellPart::Inline(substituted),
                        None => CellPart::Inline(rich),
                    },
                    other => other,
                })
                .collect();
        }
        _ => {}
    }

    writer.write_event(Event::Start(start))?;
    for part in parts {
        match part {
            CellPart::Value(v) => {
                writer.write_event(Event::Start(BytesStart::new("v")))?;
                writer.write_event(text_event(&v))?;
                writer.write_event(Event::End(BytesEnd::new("v")))?;
            }
            CellPart::Inline(rich) => write_rich_text(writer, &rich, "is")?,
            CellPart::Raw(event) => writer.write_event(event)?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn row_number(e: &BytesStart, previous: u32) -> Result<u32> {
    match attribute(e, b"r")? {
        Some(r) => Ok(r.trim().parse::<u32>()?),
        None => Ok(previous + 1),
    }
}

fn write_hidden_row(writer: &mut Writer<Vec<u8>>, row: u32) -> Result<()> {
    let row = row.to_string();
    writer.write_event(Event::Empty(
        BytesStart::new("row").with_attributes([("r", row.as_str()), ("hidden", "1")]),
    ))?;
    Ok(())
}

/// Emit empty hidden rows for every pending row number below `before`
fn write_missing_rows<I: Iterator<Item = u32>>(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut Peekable<I>,
    before: u32,
) -> Result<()> {
    while let Some(row) = pending.next_if(|row| *row < before) {
        write_hidden_row(writer, row)?;
    }
    Ok(())
}

fn render_sheet(
    sheet_xml: &str,
    shared_strings: &[RichText],
    replacements: &Replacements,
    hidden_rows: &BTreeSet<u32>,
) -> Result<String> {
    let mut reader = Reader::from_str(sheet_xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut pending = hidden_rows.iter().copied().filter(|row| *row > 0).peekable();
    let mut current_row = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"row" => {
                current_row = row_number(&e, current_row)?;
                write_missing_rows(&mut writer, &mut pending, current_row)?;
                if pending.next_if_eq(&current_row).is_some() {
                    writer.write_event(Event::Start(with_attribute(&e, "hidden", Some("1"))))?;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"row" => {
                current_row = row_number(&e, current_row)?;
                write_missing_rows(&mut writer, &mut pending, current_row)?;
                if pending.next_if_eq(&current_row).is_some() {
                    writer.write_event(Event::Empty(with_attribute(&e, "hidden", Some("1"))))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Start(e) if e.name().as_ref() == b"c" => {
                let parts = read_cell(&mut reader)?;
                write_cell(&mut writer, &e, parts, shared_strings, replacements)?;
            }
            Event::End(e) if e.name().as_ref() == b"sheetData" => {
                write_missing_rows(&mut writer, &mut pending, u32::MAX)?;
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) if e.name().as_ref() == b"sheetData" => {
                if pending.peek().is_some() {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    write_missing_rows(&mut writer, &mut pending, u32::MAX)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Text of every string cell of a sheet
fn cell_texts(sheet_xml: &str, shared_strings: &[RichText]) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(sheet_xml);
    let mut buf = Vec::new();
    let mut texts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"c" => {
                let cell_type = attribute(&e, b"t")?;
                for part in read_cell(&mut reader)? {
                    match (cell_type.as_deref(), part) {
                        (Some("s"), CellPart::Value(v)) => {
                            if let Some(rich) = v
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|idx| shared_strings.get(idx))
                            {
                                texts.push(rich.text());
                            }
                        }
                        (Some("str"), CellPart::Value(v)) => texts.push(v),
                        (_, CellPart::Inline(rich)) => texts.push(rich.text()),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(texts)
}

fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Point sheet references of a defined-name formula at another sheet
fn retarget_formula(formula: &str, old: &str, new: &str) -> String {
    static SHEET_REF: OnceLock<Regex> = OnceLock::new();
    let re = SHEET_REF.get_or_init(|| Regex::new(r"(?:'(?:[^']|'')+'|[\w\.\-]+)!").unwrap());

    re.replace_all(formula, |caps: &Captures| {
        let qualifier = &caps[0][..caps[0].len() - 1];
        let sheet = match qualifier.strip_prefix('\'').and_then(|q| q.strip_suffix('\'')) {
            Some(quoted) => quoted.replace("''", "'"),
            None => qualifier.to_string(),
        };
        if sheet == old {
            format!("{}!", quote_sheet_name(new))
        } else {
            caps[0].to_string()
        }
    })
    .into_owned()
}

fn shift_index(value: &str, template_index: usize, extra: usize) -> String {
    match value.trim().parse::<usize>() {
        Ok(i) if i > template_index => (i + extra).to_string(),
        _ => value.to_string(),
    }
}

fn shift_view_tabs(e: &BytesStart, template_index: usize, extra: usize) -> Result<Vec<(String, String)>> {
    Ok(attributes_of(e)?
        .into_iter()
        .map(|(k, v)| match k.as_str() {
            "activeTab" | "firstSheet" => {
                let v = shift_index(&v, template_index, extra);
                (k, v)
            }
            _ => (k, v),
        })
        .collect())
}

fn rewrite_workbook_xml(
    xml: &str,
    template_name: &str,
    template_index: usize,
    new_sheets: &[NewSheet],
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let extra = new_sheets.len().saturating_sub(1);
    let mut skip_current_sheet = false;

    let write_new_sheets = |writer: &mut Writer<Vec<u8>>| -> Result<()> {
        for sheet in new_sheets {
            let sheet_id = sheet.sheet_id.to_string();
            writer.write_event(Event::Empty(BytesStart::new("sheet").with_attributes([
                ("name", sheet.name.as_str()),
                ("sheetId", sheet_id.as_str()),
                ("r:id", sheet.rid.as_str()),
            ])))?;
        }
        Ok(())
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"sheet" => {
                if attribute(&e, b"name")?.as_deref() == Some(template_name) {
                    write_new_sheets(&mut writer)?;
                    skip_current_sheet = true;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                if attribute(&e, b"name")?.as_deref() == Some(template_name) {
                    write_new_sheets(&mut writer)?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"sheet" => {
                if skip_current_sheet {
                    skip_current_sheet = false;
                } else {
                    writer.write_event(Event::End(e))?;
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"definedName" => {
                let mut attrs = attributes_of(&e)?;
                let formula = read_text_node(&mut reader)?;
                let local = attrs
                    .iter()
                    .position(|(k, _)| k == "localSheetId")
                    .and_then(|pos| attrs[pos].1.trim().parse::<usize>().ok().map(|i| (pos, i)));

                let mut names: Vec<(Vec<(String, String)>, String)> = Vec::new();
                match local {
                    Some((pos, i)) if i == template_index => {
                        for (k, sheet) in new_sheets.iter().enumerate() {
                            let mut cloned = attrs.clone();
                            cloned[pos].1 = (template_index + k).to_string();
                            names.push((cloned, retarget_formula(&formula, template_name, &sheet.name)));
                        }
                    }
                    Some((pos, i)) => {
                        attrs[pos].1 = shift_index(&i.to_string(), template_index, extra);
                        names.push((attrs, formula));
                    }
                    None => {
                        let first = new_sheets.first().map(|s| s.name.as_str()).unwrap_or(template_name);
                        names.push((attrs, retarget_formula(&formula, template_name, first)));
                    }
                }

                for (attrs, formula) in names {
                    writer.write_event(Event::Start(element("definedName", &attrs)))?;
                    writer.write_event(text_event(&formula))?;
                    writer.write_event(Event::End(BytesEnd::new("definedName")))?;
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"workbookView" => {
                let attrs = shift_view_tabs(&e, template_index, extra)?;
                writer.write_event(Event::Start(element("workbookView", &attrs)))?;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"workbookView" => {
                let attrs = shift_view_tabs(&e, template_index, extra)?;
                writer.write_event(Event::Empty(element("workbookView", &attrs)))?;
            }
            Ok(Event::Eof) => break,
            Ok(e) => {
                if !skip_current_sheet {
                    writer.write_event(e)?;
                }
            }
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn rewrite_workbook_rels(xml: &str, template_rid: &str, new_sheets: &[NewSheet]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id")?.unwrap_or_default();
                let rel_type = attribute(&e, b"Type")?.unwrap_or_default();
                if id != template_rid && !rel_type.ends_with("/calcChain") {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"Relationships" => {
                for sheet in new_sheets {
                    let target = sheet.part.strip_prefix("xl/").unwrap_or(&sheet.part);
                    writer.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
                        ("Id", sheet.rid.as_str()),
                        ("Type", WORKSHEET_REL_TYPE),
                        ("Target", target),
                    ])))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn rewrite_content_types(xml: &str, removed_parts: &[String], added_parts: &[String]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.name().as_ref() == b"Override" => {
                let part_name = attribute(&e, b"PartName")?.unwrap_or_default();
                if !removed_parts.contains(&part_name) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"Types" => {
                for part in added_parts {
                    writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
                        ("PartName", part.as_str()),
                        ("ContentType", WORKSHEET_CONTENT_TYPE),
                    ])))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Only one sheet of a workbook may be selected
fn clear_tab_selected(sheet_xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(sheet_xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"sheetView" => {
                writer.write_event(Event::Start(with_attribute(&e, "tabSelected", None)))?;
            }
            Event::Empty(e) if e.name().as_ref() == b"sheetView" => {
                writer.write_event(Event::Empty(with_attribute(&e, "tabSelected", None)))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Sheet names already taken in a workbook, compared case-insensitively
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub const MAX_LEN: usize = 31;

    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            used: reserved.into_iter().map(str::to_lowercase).collect(),
        }
    }

    /// Valid, unused sheet name derived from `wanted`
    pub fn claim(&mut self, wanted: &str) -> String {
        let cleaned: String = wanted
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') && !c.is_control())
            .collect();
        let cleaned = cleaned.trim().trim_matches('\'').trim();
        let base = if cleaned.is_empty() { "Акт" } else { cleaned };

        let mut candidate = base
            .chars()
            .take(Self::MAX_LEN)
            .collect::<String>()
            .trim_end()
            .to_string();
        let mut n = 2;
        while self.used.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({})", n);
            let room = Self::MAX_LEN - suffix.chars().count();
            candidate = base.chars().take(room).collect::<String>().trim_end().to_string() + &suffix;
            n += 1;
        }
        self.used.insert(candidate.to_lowercase());
        candidate
    }
}
