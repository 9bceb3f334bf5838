//! Acts whose materials are always listed in a registry file

use super::*;
use crate::normalizer::MaterialMode;

pub struct MaterialRegistryFlavor {
    layout: ColumnLayout,
}

impl MaterialRegistryFlavor {
    pub fn new() -> Self {
        Self {
            layout: ColumnLayout {
                id: 0,
                act_number: 1,
                work_name: 2,
                code: 13,
                start_date: Some(3),
                end_date: Some(4),
                lab_date: None,
                agreement_date: Some(14),
                material_type: None,
                material_number: None,
                material_date: None,
                lab_primary: None,
                lab_secondary: None,
                next_work: Some(5),
                material_mode: MaterialMode::AlwaysRegistry,
            },
        }
    }
}

impl Default for MaterialRegistryFlavor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActFlavor for MaterialRegistryFlavor {
    fn id(&self) -> &str {
        "registry"
    }

    fn name(&self) -> &str {
        "Materials by registry"
    }

    fn sheets(&self) -> SheetNames {
        SheetNames {
            source: "Реестр для АОСР",
            template: "АОСР реестр",
        }
    }

    fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    fn effective_date_includes_start(&self) -> bool {
        true
    }

    fn lab_reports(&self) -> LabReports {
        LabReports::default()
    }
}
