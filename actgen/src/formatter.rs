//! Output formatters for batch reports

use actcraft_core::{ActFlavor, BatchReport, RecordStatus};
use anyhow::Result;
use colored::*;

/// Print the report in human-readable format with colors
pub fn print_human(report: &BatchReport) {
    println!(
        "{}",
        format!(
            "Acts: {} ({})",
            report.source.display(),
            report.flavor
        )
        .bold()
    );
    println!();

    if report.records.is_empty() {
        println!("{}", "No records found".yellow().bold());
    }

    for record in &report.records {
        let status = match record.status {
            RecordStatus::Generated => "OK".green().bold(),
            RecordStatus::Planned => "PLAN".blue().bold(),
            RecordStatus::Failed => "FAIL".red().bold(),
        };
        println!(
            "  {} {} {} {}",
            status,
            format!("№{}", record.record_id).cyan(),
            format!("(row {})", record.row).bright_black(),
            record.message
        );
    }
    println!();

    println!("{}", "Summary:".bold().underline());
    let generated = report.generated();
    let planned = report.count(RecordStatus::Planned);
    let failed = report.failed();
    if generated > 0 {
        println!("  {} {}", "Generated:".green().bold(), generated);
    }
    if planned > 0 {
        println!("  {} {}", "Planned:".blue().bold(), planned);
    }
    if failed > 0 {
        println!("  {} {}", "Failed:".red().bold(), failed);
    }
    if report.skipped_rows > 0 {
        println!("  {} {}", "Skipped rows:".bright_black(), report.skipped_rows);
    }
    if let Some(output) = &report.output {
        println!("  {} {}", "Output:".bold(), output.display());
    }
}

/// Print the report in JSON format
pub fn print_json(report: &BatchReport) -> Result<()> {
    let output = serde_json::json!({
        "report": report,
        "summary": {
            "total": report.records.len(),
            "generated": report.generated(),
            "planned": report.count(RecordStatus::Planned),
            "failed": report.failed(),
            "skipped_rows": report.skipped_rows,
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_flavors_human(flavors: &[Box<dyn ActFlavor>]) {
    println!("{}", "Act flavors:".bold().underline());
    for flavor in flavors {
        let sheets = flavor.sheets();
        println!(
            "  {} {} {}",
            flavor.id().cyan().bold(),
            flavor.name(),
            format!("(source '{}', template '{}')", sheets.source, sheets.template).bright_black()
        );
    }
}

pub fn print_flavors_json(flavors: &[Box<dyn ActFlavor>]) -> Result<()> {
    let output: Vec<_> = flavors
        .iter()
        .map(|flavor| {
            let sheets = flavor.sheets();
            serde_json::json!({
                "id": flavor.id(),
                "name": flavor.name(),
                "source_sheet": sheets.source,
                "template_sheet": sheets.template,
                "placeholders": flavor.vocabulary(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
