//! Resource Kind Registry - Load resource kind definitions from JSON
//!
//! Describes every kind of resource a plan can contain: which GCP API
//! serves it and which provider type an engine maps it to.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource kind catalog (compiled into the binary)
const KIND_FILES: &[&str] = &[include_str!("../resources/kinds.json")];

/// Resource kind definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceKindDef {
    pub display_name: String,
    /// API that must be enabled on the project
    pub service: String,
    pub provider_type: String,
    #[serde(default)]
    pub is_regional: bool,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct KindCatalog {
    #[serde(default)]
    pub kinds: HashMap<String, ResourceKindDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<KindCatalog> = OnceLock::new();

/// Get the kind registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static KindCatalog {
    REGISTRY.get_or_init(|| {
        let mut final_catalog = KindCatalog {
            kinds: HashMap::new(),
        };

        for content in KIND_FILES {
            let partial: KindCatalog = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource kind JSON: {}", e));
            final_catalog.kinds.extend(partial.kinds);
        }

        final_catalog
    })
}

/// Get a kind definition by key
pub fn get_kind_def(key: &str) -> Option<&'static ResourceKindDef> {
    get_registry().kinds.get(key)
}

/// Get all kind keys, sorted
pub fn get_all_kind_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry().kinds.keys().map(|s| s.as_str()).collect();
    keys.sort_unstable();
    keys
}

/// APIs a set of kinds needs enabled, sorted and deduplicated
pub fn required_services<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let mut services: Vec<&'static str> = keys
        .into_iter()
        .filter_map(get_kind_def)
        .map(|def| def.service.as_str())
        .collect();
    services.sort_unstable();
    services.dedup();
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::resources::ResourceKind;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(!registry.kinds.is_empty(), "Registry should have kinds");
    }

    #[test]
    fn test_every_kind_has_a_definition() {
        for kind in ResourceKind::ALL {
            assert!(
                get_kind_def(kind.key()).is_some(),
                "Missing catalog entry for {}",
                kind
            );
        }
        assert_eq!(get_all_kind_keys().len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_cloud_function_definition() {
        let def = get_kind_def("cloud-function").unwrap();
        assert_eq!(def.display_name, "Cloud Function");
        assert_eq!(def.service, "cloudfunctions.googleapis.com");
        assert!(def.is_regional);
    }

    #[test]
    fn test_required_services_dedup() {
        let services = required_services(["cloud-function", "iam-binding", "storage-bucket"]);
        assert_eq!(
            services,
            vec!["cloudfunctions.googleapis.com", "storage.googleapis.com"]
        );
    }
}
