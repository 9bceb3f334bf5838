//! Destinations for generated acts

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::xlsx_writer::{ActDocument, SheetNamer, TemplateWorkbook};
use crate::config::ID_PLACEHOLDER;
use crate::error::ActError;

/// Where rendered acts are stored
pub trait ActSink {
    /// Store one act; returns the file or sheet it went to
    fn persist(&mut self, record_id: &str, document: &ActDocument<'_>) -> Result<String, ActError>;

    /// Flush pending output; returns the output location
    fn finish(&mut self) -> Result<PathBuf, ActError>;
}

fn persistence_error(path: &Path, err: impl std::fmt::Display) -> ActError {
    ActError::Persistence {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Make a record identifier usable as part of a file name
pub fn sanitize_file_component(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']);
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// File name of the act for `record_id`
pub fn file_name_for(pattern: &str, record_id: &str) -> String {
    pattern.replace(ID_PLACEHOLDER, &sanitize_file_component(record_id))
}

/// One workbook per act inside a directory
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    pattern: String,
    written: HashSet<PathBuf>,
}

impl DirectorySink {
    /// Create the output directory if needed
    pub fn new(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Result<Self, ActError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| persistence_error(&dir, e))?;
        Ok(Self {
            dir,
            pattern: pattern.into(),
            written: HashSet::new(),
        })
    }
}

impl ActSink for DirectorySink {
    fn persist(&mut self, record_id: &str, document: &ActDocument<'_>) -> Result<String, ActError> {
        let path = self.dir.join(file_name_for(&self.pattern, record_id));
        if !self.written.insert(path.clone()) {
            warn!(record_id, path = %path.display(), "Overwriting an act written earlier in this run");
        }
        // Patterns may place acts in per-record subdirectories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
        }

        document
            .template()
            .write_single(&path, document.sheet_xml())
            .map_err(|e| persistence_error(&path, format!("{:#}", e)))?;
        debug!(record_id, path = %path.display(), "Act written");
        Ok(path.display().to_string())
    }

    fn finish(&mut self) -> Result<PathBuf, ActError> {
        Ok(self.dir.clone())
    }
}

/// Every act as a sheet of one aggregate workbook
#[derive(Debug)]
pub struct WorkbookSink<'t> {
    template: &'t TemplateWorkbook,
    path: PathBuf,
    namer: SheetNamer,
    sheets: Vec<(String, String)>,
}

impl<'t> WorkbookSink<'t> {
    pub fn new(template: &'t TemplateWorkbook, path: impl Into<PathBuf>) -> Self {
        // Other sheets of the template stay in the workbook and keep their names
        let namer = SheetNamer::new(
            template
                .sheet_names()
                .iter()
                .map(String::as_str)
                .filter(|name| *name != template.sheet_name()),
        );
        Self {
            template,
            path: path.into(),
            namer,
            sheets: Vec::new(),
        }
    }
}

impl ActSink for WorkbookSink<'_> {
    fn persist(&mut self, record_id: &str, document: &ActDocument<'_>) -> Result<String, ActError> {
        let name = self.namer.claim(document.name());
        debug!(record_id, sheet = %name, "Act collected");
        self.sheets.push((name.clone(), document.sheet_xml().to_string()));
        Ok(name)
    }

    fn finish(&mut self) -> Result<PathBuf, ActError> {
        if self.sheets.is_empty() {
            return Err(persistence_error(&self.path, "no acts to write"));
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
        }

        self.template
            .write_aggregate(&self.path, &self.sheets)
            .map_err(|e| persistence_error(&self.path, format!("{:#}", e)))?;
        Ok(self.path.clone())
    }
}
