//! Project and region discovery
//!
//! Reads the same sources the gcloud CLI does: environment variables first,
//! then the active gcloud configuration.

use std::path::PathBuf;

use super::region::region_from_zone;

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read the default project from the environment or gcloud configuration
/// Security: Validates project ID format before returning
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let content = read_active_config()?;
    lookup_property(&content, "core", "project").filter(|p| validate_project_id(p))
}

/// Read the default functions region from the environment or gcloud configuration
///
/// Falls back to `[compute] region`, then to the region of `[compute] zone`.
pub fn get_default_region() -> Option<String> {
    if let Ok(region) = std::env::var("CLOUDSDK_FUNCTIONS_REGION") {
        return Some(region);
    }
    if let Ok(zone) = std::env::var("CLOUDSDK_COMPUTE_ZONE") {
        return Some(region_from_zone(&zone));
    }

    let content = read_active_config()?;
    lookup_property(&content, "functions", "region")
        .or_else(|| lookup_property(&content, "compute", "region"))
        .or_else(|| lookup_property(&content, "compute", "zone").map(|z| region_from_zone(&z)))
}

/// Contents of the active gcloud configuration file
fn read_active_config() -> Option<String> {
    let config_dir = get_gcloud_config_dir()?;

    let config_name = std::fs::read_to_string(config_dir.join("active_config"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string());

    // Security: Validate config name to prevent path traversal
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let config_path = config_dir
        .join("configurations")
        .join(format!("config_{}", config_name));

    std::fs::read_to_string(config_path).ok()
}

/// Look up `key` inside `[section]` of an ini-style gcloud config
pub(crate) fn lookup_property(content: &str, section: &str, key: &str) -> Option<String> {
    let header = format!("[{}]", section);
    let mut in_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                let value = v.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}
