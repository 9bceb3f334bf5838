//! Batch outcome reporting

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Generated,
    /// Assembled in a dry run, nothing written
    Planned,
    Failed,
}

/// One reported record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub record_id: String,
    /// 1-based source row
    pub row: u32,
    pub status: RecordStatus,
    /// Artifact path, sheet name or failure reason
    pub message: String,
}

impl RecordOutcome {
    pub fn new(
        record_id: impl Into<String>,
        row: u32,
        status: RecordStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            row,
            status,
            message: message.into(),
        }
    }
}

/// Everything a generation run produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub flavor: String,
    pub source: PathBuf,
    /// Output directory or aggregate workbook; `None` in a dry run
    pub output: Option<PathBuf>,
    pub records: Vec<RecordOutcome>,
    /// Rows skipped for an empty identifier, not counted as records
    pub skipped_rows: usize,
}

impl BatchReport {
    pub fn new(flavor: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            flavor: flavor.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, outcome: RecordOutcome) {
        self.records.push(outcome);
    }

    pub fn count(&self, status: RecordStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn generated(&self) -> usize {
        self.count(RecordStatus::Generated)
    }

    pub fn failed(&self) -> usize {
        self.count(RecordStatus::Failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
    }

    /// Turn every successful outcome into a failure, used when the
    /// aggregate workbook could not be written
    pub fn fail_generated(&mut self, reason: &str) {
        for record in &mut self.records {
            if record.status == RecordStatus::Generated {
                record.status = RecordStatus::Failed;
                record.message = reason.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut report = BatchReport::new("concrete", "Бетон.xlsx");
        report.push(RecordOutcome::new("1", 3, RecordStatus::Generated, "Акт_№1.xlsx"));
        report.push(RecordOutcome::new("2", 4, RecordStatus::Failed, "bad material"));
        report.push(RecordOutcome::new("3", 5, RecordStatus::Generated, "Акт_№3.xlsx"));

        assert_eq!(report.generated(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().next().map(|r| r.row), Some(4));

        report.fail_generated("disk full");
        assert_eq!(report.generated(), 0);
        assert_eq!(report.failed(), 3);
    }

    #[test]
    fn test_serialization() {
        let outcome = RecordOutcome::new("7", 9, RecordStatus::Planned, "");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "planned");
        assert_eq!(json["row"], 9);
    }
}
