//! Configuration of a generation run

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::HiddenRowMap;
use crate::flavors::ActFlavor;
use crate::normalizer::NormalizeOptions;

/// Placeholder for the record identifier in `file_name_pattern`
pub const ID_PLACEHOLDER: &str = "{id}";

/// Where generated acts go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// One workbook per record inside the output directory
    #[default]
    PerRecord,
    /// One workbook with a sheet per record
    Workbook,
}

/// Sheet name overrides; `None` falls back to the flavor default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub source: Option<String>,
    pub template: Option<String>,
}

/// Per-slot overrides of the hidden template rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenRowsConfig {
    pub secondary_material: Option<Vec<u32>>,
    pub secondary_material_short: Option<Vec<u32>>,
    pub primary_lab: Option<Vec<u32>>,
    pub secondary_lab: Option<Vec<u32>>,
    pub approval: Option<Vec<u32>>,
}

impl HiddenRowsConfig {
    /// Apply the overrides on top of `base`
    pub fn resolve(&self, base: HiddenRowMap) -> HiddenRowMap {
        HiddenRowMap {
            secondary_material: self
                .secondary_material
                .clone()
                .unwrap_or(base.secondary_material),
            secondary_material_short: self
                .secondary_material_short
                .clone()
                .unwrap_or(base.secondary_material_short),
            primary_lab: self.primary_lab.clone().unwrap_or(base.primary_lab),
            secondary_lab: self.secondary_lab.clone().unwrap_or(base.secondary_lab),
            approval: self.approval.clone().unwrap_or(base.approval),
        }
    }

    fn all_rows(&self) -> impl Iterator<Item = u32> + '_ {
        [
            &self.secondary_material,
            &self.secondary_material_short,
            &self.primary_lab,
            &self.secondary_lab,
            &self.approval,
        ]
        .into_iter()
        .flatten()
        .flatten()
        .copied()
    }
}

/// Main generator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub flavor: String,
    pub source_path: PathBuf,
    pub template_path: PathBuf,
    /// Directory in per-record mode, workbook file in workbook mode
    pub output_path: PathBuf,
    pub output_mode: OutputMode,
    /// First data row of the source sheet (1-based)
    pub start_row: u32,
    pub file_name_pattern: String,
    /// Rendered for empty act number, work name and code cells
    pub missing_text: String,
    /// Fixed year for lab report numbers
    pub report_year: Option<i32>,
    pub sheets: SheetConfig,
    pub hidden_rows: HiddenRowsConfig,
    /// Normalize and assemble without writing anything
    #[serde(skip)]
    pub dry_run: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            flavor: "concrete".to_string(),
            source_path: PathBuf::from("Данные.xlsx"),
            template_path: PathBuf::from("Шаблон.xlsx"),
            output_path: PathBuf::from("Акты_скрытых_работ"),
            output_mode: OutputMode::PerRecord,
            start_row: 3,
            file_name_pattern: "Акт_№{id}.xlsx".to_string(),
            missing_text: NormalizeOptions::default().missing_text,
            report_year: None,
            sheets: SheetConfig::default(),
            hidden_rows: HiddenRowsConfig::default(),
            dry_run: false,
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: GeneratorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration against the known flavor identifiers
    pub fn validate(&self, flavor_ids: &[String]) -> Result<()> {
        if !flavor_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(self.flavor.trim()))
        {
            anyhow::bail!(
                "Configuration error: Unknown flavor '{}' (expected one of: {})",
                self.flavor,
                flavor_ids.join(", ")
            );
        }

        if self.start_row == 0 {
            anyhow::bail!("Configuration error: 'start_row' is 1-based and cannot be 0");
        }

        if !self.file_name_pattern.contains(ID_PLACEHOLDER) {
            anyhow::bail!(
                "Configuration error: 'file_name_pattern' must contain '{}'",
                ID_PLACEHOLDER
            );
        }

        if self.hidden_rows.all_rows().any(|row| row == 0) {
            anyhow::bail!("Configuration error: Hidden rows are 1-based, row 0 is invalid");
        }

        Ok(())
    }

    pub fn source_sheet<'a>(&'a self, flavor: &dyn ActFlavor) -> &'a str {
        self.sheets
            .source
            .as_deref()
            .unwrap_or(flavor.sheets().source)
    }

    pub fn template_sheet<'a>(&'a self, flavor: &dyn ActFlavor) -> &'a str {
        self.sheets
            .template
            .as_deref()
            .unwrap_or(flavor.sheets().template)
    }

    pub fn hidden_row_map(&self) -> HiddenRowMap {
        self.hidden_rows.resolve(HiddenRowMap::standard())
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            missing_text: self.missing_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavors::registry::{all_flavor_ids, create_flavor};

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.start_row, 3);
        assert_eq!(config.output_mode, OutputMode::PerRecord);
        assert_eq!(config.missing_text, "—");
        assert!(config.validate(&all_flavor_ids()).is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
            flavor = "waterproofing"
            source_path = "я. Бетон (Июль).xlsx"
            template_path = "Шаблон ГИ.xlsx"
            output_path = "Акты.xlsx"
            output_mode = "workbook"
            report_year = 2025

            [sheets]
            source = "ГИ"

            [hidden_rows]
            approval = [101, 102]
        "#;
        let config: GeneratorConfig = toml::from_str(content).unwrap();
        assert_eq!(config.flavor, "waterproofing");
        assert_eq!(config.output_mode, OutputMode::Workbook);
        assert_eq!(config.report_year, Some(2025));
        assert_eq!(config.start_row, 3);
        assert_eq!(config.file_name_pattern, "Акт_№{id}.xlsx");

        let flavor = create_flavor(&config.flavor).unwrap();
        assert_eq!(config.source_sheet(flavor.as_ref()), "ГИ");
        assert_eq!(config.template_sheet(flavor.as_ref()), "АОСР ГИ");

        let map = config.hidden_row_map();
        assert_eq!(map.approval, vec![101, 102]);
        assert_eq!(map.secondary_material, vec![76]);
    }

    #[test]
    fn test_validation() {
        let ids = all_flavor_ids();

        let mut bad = GeneratorConfig::default();
        bad.flavor = "asphalt".to_string();
        assert!(bad.validate(&ids).is_err());

        let mut bad = GeneratorConfig::default();
        bad.start_row = 0;
        assert!(bad.validate(&ids).is_err());

        let mut bad = GeneratorConfig::default();
        bad.file_name_pattern = "Акт.xlsx".to_string();
        assert!(bad.validate(&ids).is_err());

        let mut bad = GeneratorConfig::default();
        bad.hidden_rows.primary_lab = Some(vec![0]);
        assert!(bad.validate(&ids).is_err());
    }

    #[test]
    fn test_unknown_output_mode_is_rejected() {
        assert!(toml::from_str::<GeneratorConfig>("output_mode = \"zip\"").is_err());
    }
}
