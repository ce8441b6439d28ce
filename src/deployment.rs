//! Deployment input
//!
//! A [`DeploymentSpec`] is the user-supplied description of one function
//! deployment, usually read from a YAML or JSON file. Mutually exclusive
//! option groups are plain optional fields here; the resolver collapses them
//! into enums and rejects contradictory combinations.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PlanError, Result};

fn default_memory_mb() -> u32 {
    256
}

fn default_timeout_secs() -> u32 {
    60
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_true() -> bool {
    true
}

/// User inputs for a single function deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSpec {
    /// GCP project; may be filled in later from CLI flags or user config
    #[serde(default)]
    pub project: Option<String>,
    pub name: String,
    /// Prepended to every generated resource name as `<prefix>-<name>`
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub region: Option<String>,

    pub runtime: String,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    #[serde(default)]
    pub max_instances: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    pub entry_point: String,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub build_environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub ingress: IngressPolicy,

    /// Existing bucket that receives the source bundle
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Bucket created by this deployment
    #[serde(default)]
    pub bucket: Option<BucketConfig>,
    #[serde(default)]
    pub bundle: Option<BundleConfig>,
    #[serde(default)]
    pub source_repository: Option<SourceRepository>,

    #[serde(default)]
    pub service_account: Option<ServiceAccountConfig>,
    #[serde(default)]
    pub vpc_connector: Option<VpcConnectorConfig>,
    #[serde(default)]
    pub egress: EgressPolicy,

    #[serde(default)]
    pub trigger: Option<TriggerConfig>,
    #[serde(default)]
    pub schedule: Option<Schedule>,

    #[serde(default)]
    pub iam_bindings: IamBindings,
}

impl DeploymentSpec {
    /// Minimal deployment with every optional group absent
    pub fn new(project: &str, name: &str, runtime: &str, entry_point: &str) -> Self {
        Self {
            project: Some(project.to_string()),
            name: name.to_string(),
            prefix: None,
            description: None,
            labels: BTreeMap::new(),
            region: None,
            runtime: runtime.to_string(),
            memory_mb: default_memory_mb(),
            max_instances: None,
            timeout_secs: default_timeout_secs(),
            entry_point: entry_point.to_string(),
            environment_variables: BTreeMap::new(),
            build_environment_variables: BTreeMap::new(),
            ingress: IngressPolicy::default(),
            bucket_name: None,
            bucket: None,
            bundle: None,
            source_repository: None,
            service_account: None,
            vpc_connector: None,
            egress: EgressPolicy::default(),
            trigger: None,
            schedule: None,
            iam_bindings: IamBindings::default(),
        }
    }

    /// Load a deployment file; `.json` is parsed as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Parse(format!("{}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// `<prefix>-<name>`, or just the name without a prefix
    pub fn full_name(&self) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressPolicy {
    #[default]
    AllowAll,
    AllowInternalOnly,
    AllowInternalAndGclb,
}

impl IngressPolicy {
    /// Value expected by the Cloud Functions API
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::AllowAll => "ALLOW_ALL",
            Self::AllowInternalOnly => "ALLOW_INTERNAL_ONLY",
            Self::AllowInternalAndGclb => "ALLOW_INTERNAL_AND_GCLB",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EgressPolicy {
    #[default]
    PrivateRangesOnly,
    AllTraffic,
}

impl EgressPolicy {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::PrivateRangesOnly => "PRIVATE_RANGES_ONLY",
            Self::AllTraffic => "ALL_TRAFFIC",
        }
    }
}

/// Storage bucket created to hold source bundles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Overrides the generated bucket name
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the function region
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    #[serde(default)]
    pub force_destroy: bool,
    #[serde(default)]
    pub versioning: bool,
    #[serde(default = "default_true")]
    pub uniform_access: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: None,
            location: None,
            storage_class: default_storage_class(),
            force_destroy: false,
            versioning: false,
            uniform_access: true,
        }
    }
}

/// Local source directory packaged into a zip bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    pub source_dir: PathBuf,
    /// Paths relative to `source_dir`; a directory excludes everything below it
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

/// Cloud Source Repositories location of the function code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceRepository {
    pub url: String,
}

/// Either `create: true` (optionally with `account_id`) or an existing `email`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAccountConfig {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Either `create: true` with a network and CIDR range, or an existing `name`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VpcConnectorConfig {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_cidr_range: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub min_instances: Option<u32>,
    #[serde(default)]
    pub max_instances: Option<u32>,
}

/// Explicit event trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    pub event_type: String,
    pub resource: String,
    /// `Some(0)` is a deliberate choice and is kept as such
    #[serde(default)]
    pub retry_count: Option<u32>,
}

/// Cron-driven invocation through Pub/Sub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    pub cron: String,
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Message body published on each tick
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub retry_count: Option<u32>,
}

impl Schedule {
    pub fn new(cron: &str) -> Self {
        Self {
            cron: cron.to_string(),
            time_zone: None,
            payload: None,
            retry_count: None,
        }
    }
}

/// Role -> members mapping, kept in input order
///
/// Duplicate roles are preserved rather than merged so that resolution can
/// reject them instead of silently keeping the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IamBindings(Vec<(String, BTreeSet<String>)>);

impl IamBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<I, S>(&mut self, role: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .push((role.to_string(), members.into_iter().map(Into::into).collect()));
    }

    pub fn entries(&self) -> &[(String, BTreeSet<String>)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<R, I, S> FromIterator<(R, I)> for IamBindings
where
    R: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (R, I)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(role, members)| (role.into(), members.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

impl Serialize for IamBindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (role, members) in &self.0 {
            map.serialize_entry(role, members)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IamBindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BindingsVisitor;

        impl<'de> Visitor<'de> for BindingsVisitor {
            type Value = IamBindings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of IAM role to a list of members")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((role, members)) = access.next_entry::<String, BTreeSet<String>>()? {
                    entries.push((role, members));
                }
                Ok(IamBindings(entries))
            }
        }

        deserializer.deserialize_map(BindingsVisitor)
    }
}
