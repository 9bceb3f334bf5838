//! Flavor registry for looking up act flavors by identifier

use super::*;

/// Create instances of all available flavors
pub fn create_all_flavors() -> Vec<Box<dyn ActFlavor>> {
    vec![
        Box::new(concrete::ConcreteFlavor::new()),
        Box::new(waterproofing::WaterproofingFlavor::new()),
        Box::new(material_registry::MaterialRegistryFlavor::new()),
    ]
}

/// Create the flavor with the given identifier
pub fn create_flavor(id: &str) -> Option<Box<dyn ActFlavor>> {
    create_all_flavors()
        .into_iter()
        .find(|flavor| flavor.id().eq_ignore_ascii_case(id.trim()))
}

/// Identifiers of every known flavor
pub fn all_flavor_ids() -> Vec<String> {
    create_all_flavors()
        .iter()
        .map(|flavor| flavor.id().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::validate_tokens;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        assert_eq!(create_flavor("concrete").map(|f| f.id().to_string()), Some("concrete".into()));
        assert!(create_flavor(" Waterproofing ").is_some());
        assert!(create_flavor("asphalt").is_none());
        assert_eq!(all_flavor_ids(), vec!["concrete", "waterproofing", "registry"]);
    }

    #[test]
    fn test_vocabularies_are_unambiguous() {
        for flavor in create_all_flavors() {
            let vocabulary = flavor.vocabulary();
            assert!(
                validate_tokens(vocabulary.iter().copied()).is_ok(),
                "flavor {}",
                flavor.id()
            );
            let unique: HashSet<_> = vocabulary.iter().collect();
            assert_eq!(unique.len(), vocabulary.len(), "flavor {}", flavor.id());
        }
    }

    #[test]
    fn test_sheet_names_are_distinct() {
        let sheets: HashSet<_> = create_all_flavors()
            .iter()
            .map(|f| f.sheets().template)
            .collect();
        assert_eq!(sheets.len(), 3);
    }
}
