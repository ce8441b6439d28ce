//! Plan emission
//!
//! Composes the resolved context, the trigger selection and the packaged
//! bundle into a [`ResolvedPlan`]. Every configuration check runs before the
//! bundle is packaged, and the finished plan is checked for dangling
//! references before it is returned.

use std::collections::HashSet;
use tracing::{info, warn};

use super::resources::{
    BucketResource, BundleObject, FunctionResource, FunctionSource, IamBindingResource,
    ResourceAddr, ResourceKind, Sensitive, ServiceAccountResource, VpcConnectorResource,
};
use super::ResolvedPlan;
use crate::bundle::{self, NamedArtifact, Packager};
use crate::deployment::DeploymentSpec;
use crate::error::{PlanError, Result};
use crate::resolve::{
    connector_id, resolve_context, ConnectorChoice, ResolvedContext, ServiceAccountChoice,
    SourceLocation,
};
use crate::trigger::{self, TriggerSelection};

/// Resolve a deployment into a complete plan
pub fn resolve(spec: &DeploymentSpec, packager: &dyn Packager) -> Result<ResolvedPlan> {
    let ctx = resolve_context(spec)?;
    let selection = trigger::select(spec, &ctx)?;
    let iam_bindings = build_iam_bindings(spec, &ctx)?;

    let artifact = match &ctx.source {
        SourceLocation::Bundle { config, .. } => {
            let output = config
                .output_path
                .clone()
                .unwrap_or_else(|| bundle::default_output_path(&ctx.full_name));
            Some(bundle::name(packager, &config.source_dir, &config.excludes, &output)?)
        }
        SourceLocation::Repository { .. } => None,
    };

    let plan = assemble(spec, &ctx, selection, artifact, iam_bindings)?;
    plan.check_references()?;

    info!(
        function = %plan.function.name,
        trigger = plan.trigger_mode.label(),
        resources = plan.descriptors().len(),
        "plan resolved"
    );

    Ok(plan)
}

fn assemble(
    spec: &DeploymentSpec,
    ctx: &ResolvedContext,
    selection: TriggerSelection,
    artifact: Option<NamedArtifact>,
    iam_bindings: Vec<IamBindingResource>,
) -> Result<ResolvedPlan> {
    let bucket = ctx.created_bucket.as_ref().map(|name| {
        let config = spec.bucket.clone().unwrap_or_default();
        BucketResource {
            name: name.clone(),
            project: ctx.project.clone(),
            location: config.location.unwrap_or_else(|| ctx.region.clone()),
            storage_class: config.storage_class,
            force_destroy: config.force_destroy,
            versioning: config.versioning,
            uniform_bucket_level_access: config.uniform_access,
            labels: ctx.labels.clone(),
            depends_on: vec![],
        }
    });

    let mut function_deps = Vec::new();

    let (source, bundle_object) = match (&ctx.source, artifact) {
        (SourceLocation::Repository { url }, _) => (FunctionSource::Repository { url: url.clone() }, None),
        (SourceLocation::Bundle { bucket: bucket_name, .. }, Some(artifact)) => {
            let depends_on = match &bucket {
                Some(b) if &b.name == bucket_name => {
                    vec![ResourceAddr::new(ResourceKind::StorageBucket, b.name.clone())]
                }
                _ => vec![],
            };
            let object = BundleObject {
                name: artifact.object_name.clone(),
                bucket: bucket_name.clone(),
                source: artifact.artifact_path.display().to_string(),
                md5: artifact.digest,
                depends_on,
            };
            function_deps.push(ResourceAddr::new(
                ResourceKind::StorageObject,
                format!("{}/{}", object.bucket, object.name),
            ));
            (
                FunctionSource::Bucket {
                    bucket: bucket_name.clone(),
                    object: artifact.object_name,
                },
                Some(object),
            )
        }
        (SourceLocation::Bundle { .. }, None) => {
            return Err(PlanError::conflict("source bundle was not packaged"));
        }
    };

    let service_account = match &ctx.service_account {
        ServiceAccountChoice::Create {
            account_id,
            display_name,
        } => {
            function_deps.push(ResourceAddr::new(ResourceKind::ServiceAccount, account_id.clone()));
            Some(ServiceAccountResource {
                account_id: account_id.clone(),
                project: ctx.project.clone(),
                display_name: display_name.clone(),
                email: ctx.service_account_email.clone().unwrap_or_default(),
                depends_on: vec![],
            })
        }
        ServiceAccountChoice::Existing { .. } | ServiceAccountChoice::Default => None,
    };

    let vpc_connector = match &ctx.connector {
        ConnectorChoice::Create {
            name,
            network,
            ip_cidr_range,
            min_instances,
            max_instances,
        } => {
            function_deps.push(ResourceAddr::new(ResourceKind::VpcConnector, name.clone()));
            Some(VpcConnectorResource {
                name: name.clone(),
                id: connector_id(&ctx.project, &ctx.region, name),
                project: ctx.project.clone(),
                region: ctx.region.clone(),
                network: network.clone(),
                ip_cidr_range: ip_cidr_range.clone(),
                min_instances: *min_instances,
                max_instances: *max_instances,
                depends_on: vec![],
            })
        }
        ConnectorChoice::Existing { .. } | ConnectorChoice::Absent => None,
    };

    if let Some(topic) = &selection.topic {
        function_deps.push(ResourceAddr::new(ResourceKind::PubsubTopic, topic.name.clone()));
    }

    let function = FunctionResource {
        name: ctx.full_name.clone(),
        project: ctx.project.clone(),
        region: ctx.region.clone(),
        description: spec.description.clone(),
        runtime: spec.runtime.clone(),
        available_memory_mb: spec.memory_mb,
        timeout_secs: spec.timeout_secs,
        max_instances: spec.max_instances,
        entry_point: spec.entry_point.clone(),
        environment_variables: Sensitive(spec.environment_variables.clone()),
        build_environment_variables: spec.build_environment_variables.clone(),
        labels: ctx.labels.clone(),
        ingress_settings: spec.ingress.as_api_str().to_string(),
        service_account_email: ctx.service_account_email.clone(),
        vpc_connector: ctx.vpc_egress_target.clone(),
        vpc_connector_egress_settings: ctx
            .vpc_egress_target
            .as_ref()
            .map(|_| spec.egress.as_api_str().to_string()),
        source,
        trigger_http: selection.event_trigger.is_none(),
        event_trigger: selection.event_trigger,
        depends_on: function_deps,
    };

    Ok(ResolvedPlan {
        trigger_mode: selection.mode,
        bucket,
        bundle_object,
        service_account,
        vpc_connector,
        topic: selection.topic,
        scheduler_job: selection.job,
        function,
        iam_bindings,
    })
}

/// One authoritative binding per role, sorted by role
fn build_iam_bindings(spec: &DeploymentSpec, ctx: &ResolvedContext) -> Result<Vec<IamBindingResource>> {
    let function_addr = ResourceAddr::new(ResourceKind::CloudFunction, ctx.full_name.clone());
    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(spec.iam_bindings.entries().len());

    for (role, members) in spec.iam_bindings.entries() {
        if role.trim().is_empty() {
            return Err(PlanError::invalid("iam_bindings", "role must not be empty"));
        }
        if !seen.insert(role.as_str()) {
            return Err(PlanError::DuplicateKey { role: role.clone() });
        }
        if members.is_empty() {
            warn!(role = %role, "IAM binding has no members and will clear the role");
        }

        bindings.push(IamBindingResource {
            function: ctx.full_name.clone(),
            project: ctx.project.clone(),
            region: ctx.region.clone(),
            role: role.clone(),
            members: members.clone(),
            depends_on: vec![function_addr.clone()],
        });
    }

    bindings.sort_by(|a, b| a.role.cmp(&b.role));
    Ok(bindings)
}
