//! Provisioning engine hand-off
//!
//! The engine owns the actual create/update/delete lifecycle against the
//! cloud. This module only defines the seam and hands a resolved plan over
//! one descriptor at a time, in dependency order.

use tracing::{debug, info};

use crate::error::{PlanError, Result};
use crate::plan::resources::{ResourceAddr, ResourceDescriptor};
use crate::plan::ResolvedPlan;
use crate::resource::get_kind_def;

/// External system that creates or updates resources
///
/// Implementations must be idempotent per resource name. Errors are opaque
/// to this crate and are passed back to the caller unchanged.
pub trait ProvisioningEngine {
    fn apply(&mut self, descriptor: &ResourceDescriptor<'_>) -> anyhow::Result<()>;
}

/// Hand every descriptor in `plan` to `engine`, stopping at the first failure
pub fn hand_off(plan: &ResolvedPlan, engine: &mut dyn ProvisioningEngine) -> Result<()> {
    // A plan with dangling references must never reach the engine
    plan.check_references()?;

    let descriptors = plan.descriptors();
    info!(resources = descriptors.len(), "handing plan to provisioning engine");

    for descriptor in &descriptors {
        let addr = descriptor.addr();
        debug!(addr = %addr, "applying resource");
        engine.apply(descriptor).map_err(PlanError::Engine)?;
    }

    Ok(())
}

/// Engine that applies nothing and records what it was given
#[derive(Debug, Default)]
pub struct DryRunEngine {
    pub applied: Vec<ResourceAddr>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProvisioningEngine for DryRunEngine {
    fn apply(&mut self, descriptor: &ResourceDescriptor<'_>) -> anyhow::Result<()> {
        let addr = descriptor.addr();
        let provider_type = get_kind_def(descriptor.kind().key())
            .map(|def| def.provider_type.as_str())
            .unwrap_or("unknown");
        info!(addr = %addr, provider_type, "dry run: would create or update");
        self.applied.push(addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ZipPackager;
    use crate::deployment::{DeploymentSpec, Schedule, SourceRepository};
    use crate::plan::resolve;
    use crate::plan::resources::ResourceKind;

    fn plan() -> ResolvedPlan {
        let mut spec = DeploymentSpec::new("demo-project-1", "reports", "java17", "com.example.Main");
        spec.source_repository = Some(SourceRepository {
            url: "https://source.developers.google.com/projects/demo-project-1/repos/reports".into(),
        });
        spec.schedule = Some(Schedule::new("30 6 * * 1"));
        spec.iam_bindings = vec![("roles/cloudfunctions.invoker", vec!["group:ops@example.com"])]
            .into_iter()
            .collect();
        resolve(&spec, &ZipPackager).unwrap()
    }

    /// Fails on the first resource of the given kind
    struct FailingEngine {
        fail_on: ResourceKind,
        applied: Vec<ResourceKind>,
    }

    impl ProvisioningEngine for FailingEngine {
        fn apply(&mut self, descriptor: &ResourceDescriptor<'_>) -> anyhow::Result<()> {
            if descriptor.kind() == self.fail_on {
                anyhow::bail!("permission denied on {}", descriptor.addr());
            }
            self.applied.push(descriptor.kind());
            Ok(())
        }
    }

    #[test]
    fn test_dry_run_receives_every_descriptor_in_order() {
        let plan = plan();
        let mut engine = DryRunEngine::new();
        hand_off(&plan, &mut engine).unwrap();
        assert_eq!(engine.applied, plan.addrs());
        assert_eq!(engine.applied.len(), 4);
    }

    #[test]
    fn test_first_engine_error_stops_hand_off() {
        let plan = plan();
        let mut engine = FailingEngine {
            fail_on: ResourceKind::SchedulerJob,
            applied: vec![],
        };

        let err = hand_off(&plan, &mut engine).unwrap_err();
        assert!(matches!(err, PlanError::Engine(_)));
        assert!(crate::error::format_err_chain(&err).contains("permission denied"));
        assert_eq!(engine.applied, vec![ResourceKind::PubsubTopic]);
    }
}
