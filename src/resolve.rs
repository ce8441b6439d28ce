//! Derived-value resolution
//!
//! Computes every value that depends on which optional resources will exist,
//! before any of them is built. The result is a [`ResolvedContext`] that the
//! trigger selector, the artifact namer and the plan emitter read from;
//! nothing downstream re-derives these values.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::deployment::{BundleConfig, DeploymentSpec};
use crate::error::{PlanError, Result};
use crate::gcp::project::validate_project_id;
use crate::gcp::region::{canonicalize, DEFAULT_REGION};

/// Label added to every resource that carries labels
pub const MANAGED_BY_LABEL: (&str, &str) = ("managed-by", "cloudfn-plan");

const MAX_NAME_LEN: usize = 63;
const MAX_ACCOUNT_ID_LEN: usize = 30;
const MIN_ACCOUNT_ID_LEN: usize = 6;
const MAX_CONNECTOR_NAME_LEN: usize = 25;

/// Where the function code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Repository { url: String },
    Bundle { bucket: String, config: BundleConfig },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAccountChoice {
    Create {
        account_id: String,
        display_name: String,
    },
    Existing {
        email: String,
    },
    /// Platform default runtime identity
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorChoice {
    Create {
        name: String,
        network: String,
        ip_cidr_range: String,
        min_instances: Option<u32>,
        max_instances: Option<u32>,
    },
    Existing {
        name: String,
    },
    Absent,
}

/// Values derived once from a [`DeploymentSpec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    pub project: String,
    pub full_name: String,
    /// Canonical region
    pub region: String,
    /// User labels plus the managed-by label
    pub labels: BTreeMap<String, String>,
    /// Bucket receiving the source bundle, if any
    pub bucket_name: Option<String>,
    /// Name of the bucket this plan creates
    pub created_bucket: Option<String>,
    pub source: SourceLocation,
    pub service_account: ServiceAccountChoice,
    pub service_account_email: Option<String>,
    pub connector: ConnectorChoice,
    pub vpc_egress_target: Option<String>,
    /// No explicit trigger and a schedule was given. Gates topic creation,
    /// scheduler job creation and trigger mode selection.
    pub scheduled_trigger_requested: bool,
}

/// Validate the deployment and compute its derived values
pub fn resolve_context(spec: &DeploymentSpec) -> Result<ResolvedContext> {
    let project = spec
        .project
        .clone()
        .ok_or_else(|| PlanError::invalid("project", "not set"))?;
    if !validate_project_id(&project) {
        return Err(PlanError::invalid(
            "project",
            format!("'{}' is not a valid project id", project),
        ));
    }

    validate_compute(spec)?;

    let full_name = spec.full_name();
    if full_name.len() > MAX_NAME_LEN {
        return Err(PlanError::invalid(
            "name",
            format!("'{}' is longer than {} characters", full_name, MAX_NAME_LEN),
        ));
    }

    let region = canonicalize(spec.region.as_deref().unwrap_or(DEFAULT_REGION));

    let mut labels = spec.labels.clone();
    labels.insert(MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string());

    let created_bucket = match &spec.bucket {
        Some(bucket) => {
            let name = bucket
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-source", project, full_name));
            if name.len() < 3 || name.len() > MAX_NAME_LEN {
                return Err(PlanError::invalid(
                    "bucket.name",
                    format!("'{}' must be 3-{} characters; set bucket.name", name, MAX_NAME_LEN),
                ));
            }
            Some(name)
        }
        None => None,
    };
    let bucket_name = spec.bucket_name.clone().or_else(|| created_bucket.clone());

    let source = resolve_source(spec, bucket_name.as_deref())?;
    let (service_account, service_account_email) = resolve_service_account(spec, &project, &full_name)?;
    let (connector, vpc_egress_target) = resolve_connector(spec, &project, &region, &full_name)?;

    let scheduled_trigger_requested = spec.trigger.is_none() && spec.schedule.is_some();

    debug!(
        full_name = %full_name,
        region = %region,
        bucket = ?bucket_name,
        service_account = ?service_account_email,
        vpc_egress_target = ?vpc_egress_target,
        scheduled_trigger_requested,
        "derived values resolved"
    );

    Ok(ResolvedContext {
        project,
        full_name,
        region,
        labels,
        bucket_name,
        created_bucket,
        source,
        service_account,
        service_account_email,
        connector,
        vpc_egress_target,
        scheduled_trigger_requested,
    })
}

fn validate_compute(spec: &DeploymentSpec) -> Result<()> {
    // Both parts of the full name end up in every generated resource name
    if !is_name_part(&spec.name) {
        return Err(PlanError::invalid(
            "name",
            "must start with a lowercase letter and contain only lowercase letters, digits and hyphens",
        ));
    }
    if let Some(prefix) = spec.prefix.as_deref().filter(|p| !p.is_empty()) {
        if !is_name_part(prefix) {
            return Err(PlanError::invalid(
                "prefix",
                format!(
                    "'{}' must start with a lowercase letter and contain only lowercase letters, digits and hyphens",
                    prefix
                ),
            ));
        }
    }
    if spec.runtime.trim().is_empty() {
        return Err(PlanError::invalid("runtime", "must not be empty"));
    }
    if spec.entry_point.trim().is_empty() {
        return Err(PlanError::invalid("entry_point", "must not be empty"));
    }
    if !(128..=8192).contains(&spec.memory_mb) {
        return Err(PlanError::invalid(
            "memory_mb",
            format!("{} is outside 128..=8192", spec.memory_mb),
        ));
    }
    if !(1..=540).contains(&spec.timeout_secs) {
        return Err(PlanError::invalid(
            "timeout_secs",
            format!("{} is outside 1..=540", spec.timeout_secs),
        ));
    }
    Ok(())
}

fn is_name_part(part: &str) -> bool {
    part.starts_with(|c: char| c.is_ascii_lowercase())
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn resolve_source(spec: &DeploymentSpec, bucket_name: Option<&str>) -> Result<SourceLocation> {
    match (&spec.bundle, &spec.source_repository) {
        (Some(_), Some(_)) => Err(PlanError::conflict(
            "bundle and source_repository are mutually exclusive",
        )),
        (None, Some(repo)) => {
            if repo.url.trim().is_empty() {
                return Err(PlanError::invalid("source_repository.url", "must not be empty"));
            }
            Ok(SourceLocation::Repository {
                url: repo.url.clone(),
            })
        }
        (bundle, None) => {
            let bucket = bucket_name.ok_or_else(|| {
                PlanError::conflict(
                    "no bucket for the source bundle: set bucket_name or bucket, or use source_repository",
                )
            })?;
            let config = bundle.clone().ok_or_else(|| {
                PlanError::conflict("nothing to deploy: set bundle or source_repository")
            })?;
            Ok(SourceLocation::Bundle {
                bucket: bucket.to_string(),
                config,
            })
        }
    }
}

fn resolve_service_account(
    spec: &DeploymentSpec,
    project: &str,
    full_name: &str,
) -> Result<(ServiceAccountChoice, Option<String>)> {
    let Some(sa) = &spec.service_account else {
        return Ok((ServiceAccountChoice::Default, None));
    };

    match (sa.create, &sa.email) {
        (true, Some(_)) => Err(PlanError::conflict(
            "service_account: create and email are mutually exclusive",
        )),
        (true, None) => {
            let account_id = sa
                .account_id
                .clone()
                .unwrap_or_else(|| truncate_name(&format!("{}-sa", full_name), MAX_ACCOUNT_ID_LEN));
            validate_resource_name(
                "service_account.account_id",
                &account_id,
                MIN_ACCOUNT_ID_LEN,
                MAX_ACCOUNT_ID_LEN,
            )?;
            let email = format!("{}@{}.iam.gserviceaccount.com", account_id, project);
            let display_name = sa
                .display_name
                .clone()
                .unwrap_or_else(|| format!("Runtime identity for {}", full_name));
            Ok((
                ServiceAccountChoice::Create {
                    account_id,
                    display_name,
                },
                Some(email),
            ))
        }
        (false, Some(email)) => {
            if sa.account_id.is_some() {
                warn!("service_account.account_id is ignored without create: true");
            }
            Ok((
                ServiceAccountChoice::Existing {
                    email: email.clone(),
                },
                Some(email.clone()),
            ))
        }
        (false, None) => Err(PlanError::conflict(
            "service_account needs either create: true or an email",
        )),
    }
}

fn resolve_connector(
    spec: &DeploymentSpec,
    project: &str,
    region: &str,
    full_name: &str,
) -> Result<(ConnectorChoice, Option<String>)> {
    let Some(vpc) = &spec.vpc_connector else {
        return Ok((ConnectorChoice::Absent, None));
    };

    if !vpc.create {
        let name = vpc.name.clone().ok_or_else(|| {
            PlanError::conflict("vpc_connector needs either create: true or a name")
        })?;
        if vpc.ip_cidr_range.is_some() || vpc.network.is_some() {
            warn!("vpc_connector network settings are ignored for an existing connector");
        }
        return Ok((ConnectorChoice::Existing { name: name.clone() }, Some(name)));
    }

    let (Some(network), Some(ip_cidr_range)) = (&vpc.network, &vpc.ip_cidr_range) else {
        return Err(PlanError::conflict(
            "vpc_connector with create: true needs network and ip_cidr_range",
        ));
    };
    let name = vpc
        .name
        .clone()
        .unwrap_or_else(|| truncate_name(&format!("{}-vpc", full_name), MAX_CONNECTOR_NAME_LEN));
    validate_resource_name("vpc_connector.name", &name, 2, MAX_CONNECTOR_NAME_LEN)?;

    let id = connector_id(project, region, &name);
    Ok((
        ConnectorChoice::Create {
            name,
            network: network.clone(),
            ip_cidr_range: ip_cidr_range.clone(),
            min_instances: vpc.min_instances,
            max_instances: vpc.max_instances,
        },
        Some(id),
    ))
}

pub fn connector_id(project: &str, region: &str, name: &str) -> String {
    format!("projects/{}/locations/{}/connectors/{}", project, region, name)
}

/// Cut a generated name to `max` characters without leaving a trailing hyphen
fn truncate_name(name: &str, max: usize) -> String {
    let cut: String = name.chars().take(max).collect();
    cut.trim_end_matches('-').to_string()
}

/// `[a-z][-a-z0-9]*[a-z0-9]` within the given length bounds
fn validate_resource_name(field: &str, name: &str, min: usize, max: usize) -> Result<()> {
    let len_ok = (min..=max).contains(&name.len());
    let start_ok = name.starts_with(|c: char| c.is_ascii_lowercase());
    let end_ok = !name.ends_with('-');
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if len_ok && start_ok && end_ok && chars_ok {
        Ok(())
    } else {
        Err(PlanError::invalid(
            field,
            format!(
                "'{}' must be {}-{} lowercase letters, digits or hyphens, starting with a letter",
                name, min, max
            ),
        ))
    }
}
