//! actcraft-core: generate construction acts from spreadsheet records
//!
//! Rows of a source sheet are normalized into typed records, turned into act
//! texts by an act flavor and written into copies of a template sheet.

pub mod assembler;
pub mod config;
pub mod error;
pub mod flavors;
pub mod normalizer;
pub mod reader;
pub mod report;
pub mod template;
pub mod writer;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub use assembler::{AssembledAct, AssemblyContext, HiddenRowMap, assemble};
pub use config::{GeneratorConfig, OutputMode};
pub use error::{ActError, RecordError};
pub use flavors::ActFlavor;
pub use normalizer::{MaterialEntry, NormalizedRecord, normalize};
pub use report::{BatchReport, RecordOutcome, RecordStatus};
pub use template::Replacements;

use crate::reader::RawRecord;
use crate::writer::{ActSink, DirectorySink, TemplateWorkbook, WorkbookSink};

/// Main generator interface
pub struct ActGenerator {
    config: GeneratorConfig,
    flavor: Box<dyn ActFlavor>,
    today: NaiveDate,
}

impl ActGenerator {
    /// Create a generator; fails for an invalid configuration
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate(&flavors::registry::all_flavor_ids())?;
        let flavor = flavors::registry::create_flavor(&config.flavor)
            .ok_or_else(|| anyhow::anyhow!("Unknown flavor '{}'", config.flavor))?;
        Ok(Self {
            config,
            flavor,
            today: chrono::Local::now().date_naive(),
        })
    }

    /// Fix the date used when a record has no usable date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn flavor(&self) -> &dyn ActFlavor {
        self.flavor.as_ref()
    }

    /// Run the whole batch.
    ///
    /// Missing inputs, unreadable workbooks and a failed aggregate save are
    /// fatal; any other failure is confined to its record and reported.
    pub fn run(&self) -> Result<BatchReport> {
        let config = &self.config;
        for (what, path) in [
            ("source workbook", &config.source_path),
            ("template workbook", &config.template_path),
        ] {
            if !path.is_file() {
                return Err(ActError::MissingInputFile {
                    what,
                    path: path.clone(),
                }
                .into());
            }
        }

        let flavor = self.flavor.as_ref();
        let source_sheet = config.source_sheet(flavor);
        let template_sheet = config.template_sheet(flavor);
        info!(
            flavor = flavor.id(),
            source = %config.source_path.display(),
            sheet = source_sheet,
            "Generating acts"
        );

        let rows = reader::read_rows(&config.source_path, source_sheet, config.start_row)?;
        let template = TemplateWorkbook::open(&config.template_path, template_sheet)?;
        self.check_placeholders(&template);

        let mut sink: Option<Box<dyn ActSink + '_>> = match (config.dry_run, config.output_mode) {
            (true, _) => None,
            (false, OutputMode::PerRecord) => Some(Box::new(DirectorySink::new(
                &config.output_path,
                config.file_name_pattern.clone(),
            )?)),
            (false, OutputMode::Workbook) => {
                Some(Box::new(WorkbookSink::new(&template, &config.output_path)))
            }
        };

        let ctx = AssemblyContext {
            today: self.today,
            report_year: config.report_year,
        };
        let hidden_map = config.hidden_row_map();
        let options = config.normalize_options();
        let vocabulary = flavor.vocabulary();
        let mut report = BatchReport::new(flavor.id(), &config.source_path);

        for raw in &rows {
            let record = match normalize(raw, flavor.layout(), &options) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(row = raw.row, "Skipping row without identifier");
                    report.skipped_rows += 1;
                    continue;
                }
                Err(e) => {
                    let err = ActError::record(raw_id(raw, flavor), raw.row, e);
                    warn!("{}", err);
                    report.push(failed(raw_id(raw, flavor), raw.row, &err));
                    continue;
                }
            };

            let act = assemble(flavor, &record, &ctx, &hidden_map);
            let status = if sink.is_some() {
                RecordStatus::Generated
            } else {
                RecordStatus::Planned
            };
            let rendered = self.render(&template, &record, &act, &vocabulary, sink.as_deref_mut());
            let outcome = match rendered {
                Ok(location) => RecordOutcome::new(&record.id, record.row, status, location),
                Err(err) => {
                    warn!("{}", err);
                    failed(&record.id, record.row, &err)
                }
            };
            report.push(outcome);
        }

        if let Some(sink) = sink.as_mut() {
            if report.generated() == 0 && config.output_mode == OutputMode::Workbook {
                warn!("No acts generated, aggregate workbook not written");
            } else {
                match sink.finish() {
                    Ok(path) => {
                        info!(path = %path.display(), "Acts written");
                        report.output = Some(path);
                    }
                    Err(err) => {
                        report.fail_generated(&err.to_string());
                        return Err(err.into());
                    }
                }
            }
        }

        info!(
            generated = report.generated(),
            failed = report.failed(),
            skipped = report.skipped_rows,
            "Done"
        );
        Ok(report)
    }

    fn check_placeholders(&self, template: &TemplateWorkbook) {
        let vocabulary = self.flavor.vocabulary();
        match template.placeholders() {
            Ok(labels) => {
                for label in labels
                    .iter()
                    .filter(|l| !vocabulary.iter().any(|token| *token == l.as_str()))
                {
                    warn!(
                        label = %label,
                        template = %template.path().display(),
                        sheet = template.sheet_name(),
                        "Template label is not a placeholder of this flavor and stays as written"
                    );
                }
            }
            Err(e) => warn!("Could not scan template placeholders: {:#}", e),
        }
    }

    /// Instantiate the template for one act and hand it to the sink
    fn render(
        &self,
        template: &TemplateWorkbook,
        record: &NormalizedRecord,
        act: &AssembledAct,
        vocabulary: &[&str],
        sink: Option<&mut (dyn ActSink + '_)>,
    ) -> Result<String, ActError> {
        let mut document = template.instantiate(format!("Акт №{}", record.id));
        document
            .substitute_and_hide(&act.replacements, &act.hidden_rows)
            .map_err(|e| ActError::record(&record.id, record.row, format!("{:#}", e)))?;

        let leftover = document
            .remaining_tokens(vocabulary)
            .map_err(|e| ActError::record(&record.id, record.row, format!("{:#}", e)))?;
        if !leftover.is_empty() {
            return Err(ActError::record(
                &record.id,
                record.row,
                format!("placeholders left unfilled: {}", leftover.join(", ")),
            ));
        }

        match sink {
            Some(sink) => sink.persist(&record.id, &document),
            None => Ok(format!(
                "act date {}, hidden rows {:?}",
                act.effective_date_text(),
                act.hidden_rows
            )),
        }
    }
}

fn raw_id(raw: &RawRecord, flavor: &dyn ActFlavor) -> String {
    raw.get(flavor.layout().id).to_text().trim().to_string()
}

fn failed(record_id: impl Into<String>, row: u32, err: &ActError) -> RecordOutcome {
    let reason = match err {
        ActError::RecordProcessing { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    RecordOutcome::new(record_id, row, RecordStatus::Failed, reason)
}
