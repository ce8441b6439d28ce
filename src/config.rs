//! Configuration Management
//!
//! Handles persistent user defaults for cloudfn-plan.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gcp::project::{get_default_project, get_default_region};
use crate::gcp::region::{canonicalize, DEFAULT_REGION};

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default project for deployments that do not name one
    #[serde(default)]
    pub project_id: Option<String>,
    /// Default region for deployments that do not name one
    #[serde(default)]
    pub region: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudfn-plan").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Get effective project (CLI > deployment file > config > gcloud default)
    pub fn effective_project(&self, cli: Option<&str>, file: Option<&str>) -> Option<String> {
        cli.or(file)
            .map(str::to_string)
            .or_else(|| self.project_id.clone())
            .or_else(get_default_project)
    }

    /// Get effective region (CLI > deployment file > config > gcloud default > us-central1)
    pub fn effective_region(&self, cli: Option<&str>, file: Option<&str>) -> String {
        let region = cli
            .or(file)
            .map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(get_default_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        canonicalize(&region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_beats_file_beats_config() {
        let config = Config {
            project_id: Some("config-project".into()),
            region: Some("europe-west".into()),
        };

        assert_eq!(
            config.effective_project(Some("cli-project"), Some("file-project")).as_deref(),
            Some("cli-project")
        );
        assert_eq!(
            config.effective_project(None, Some("file-project")).as_deref(),
            Some("file-project")
        );
        assert_eq!(
            config.effective_project(None, None).as_deref(),
            Some("config-project")
        );

        assert_eq!(config.effective_region(Some("asia-east1"), None), "asia-east1");
        assert_eq!(config.effective_region(None, None), "europe-west1");
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = Config {
            project_id: Some("demo-project-1".into()),
            region: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.project_id.as_deref(), Some("demo-project-1"));
        assert!(back.region.is_none());
    }
}
