//! Resolved resource plans
//!
//! A [`ResolvedPlan`] is the complete, internally consistent set of
//! resources for one function deployment. Conditional resources are
//! `Option`s; [`ResolvedPlan::descriptors`] drops the absent ones and
//! returns the rest in dependency order for the provisioning engine.
//!
//! - [`resources`] - Descriptor types and resource addressing
//! - [`emit`] - Builds a plan from a deployment

pub mod emit;
pub mod resources;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PlanError, Result};
use crate::trigger::TriggerMode;
use resources::{
    BucketResource, BundleObject, FunctionResource, IamBindingResource, ResourceAddr,
    ResourceDescriptor, SchedulerJobResource, ServiceAccountResource, TopicResource,
    VpcConnectorResource,
};

pub use emit::resolve;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    pub trigger_mode: TriggerMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_object: Option<BundleObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_connector: Option<VpcConnectorResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_job: Option<SchedulerJobResource>,
    pub function: FunctionResource,
    pub iam_bindings: Vec<IamBindingResource>,
}

impl ResolvedPlan {
    /// Present resources, dependencies before dependents
    pub fn descriptors(&self) -> Vec<ResourceDescriptor<'_>> {
        let mut out = Vec::with_capacity(7 + self.iam_bindings.len());

        if let Some(r) = &self.bucket {
            out.push(ResourceDescriptor::StorageBucket(r));
        }
        if let Some(r) = &self.bundle_object {
            out.push(ResourceDescriptor::StorageObject(r));
        }
        if let Some(r) = &self.service_account {
            out.push(ResourceDescriptor::ServiceAccount(r));
        }
        if let Some(r) = &self.vpc_connector {
            out.push(ResourceDescriptor::VpcConnector(r));
        }
        if let Some(r) = &self.topic {
            out.push(ResourceDescriptor::PubsubTopic(r));
        }
        if let Some(r) = &self.scheduler_job {
            out.push(ResourceDescriptor::SchedulerJob(r));
        }
        out.push(ResourceDescriptor::CloudFunction(&self.function));
        out.extend(self.iam_bindings.iter().map(ResourceDescriptor::IamBinding));

        out
    }

    pub fn addrs(&self) -> Vec<ResourceAddr> {
        self.descriptors().iter().map(|d| d.addr()).collect()
    }

    /// Verify every `depends_on` entry names a resource that appears
    /// earlier in [`descriptors`](Self::descriptors).
    ///
    /// Holding this means the reference graph is complete and acyclic.
    pub fn check_references(&self) -> Result<()> {
        let descriptors = self.descriptors();
        let all: HashSet<ResourceAddr> = descriptors.iter().map(|d| d.addr()).collect();
        let mut seen: HashSet<ResourceAddr> = HashSet::with_capacity(all.len());

        for descriptor in &descriptors {
            let addr = descriptor.addr();
            for dep in descriptor.depends_on() {
                if !all.contains(dep) || !seen.contains(dep) {
                    return Err(PlanError::UnresolvedReference {
                        from: addr.to_string(),
                        to: dep.to_string(),
                    });
                }
            }
            seen.insert(addr);
        }

        Ok(())
    }
}
