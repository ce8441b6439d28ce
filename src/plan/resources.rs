//! Resource descriptors
//!
//! One struct per resource kind the plan can contain. Each descriptor lists
//! the in-plan resources it depends on in `depends_on`; references to
//! resources outside the plan (an existing bucket, an existing connector)
//! are plain strings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::trigger::RetryPolicy;

/// Kinds of resources a plan can hand to the provisioning engine
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    StorageBucket,
    StorageObject,
    ServiceAccount,
    VpcConnector,
    PubsubTopic,
    SchedulerJob,
    CloudFunction,
    IamBinding,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        Self::StorageBucket,
        Self::StorageObject,
        Self::ServiceAccount,
        Self::VpcConnector,
        Self::PubsubTopic,
        Self::SchedulerJob,
        Self::CloudFunction,
        Self::IamBinding,
    ];

    /// Key into the resource kind catalog
    pub fn key(&self) -> &'static str {
        match self {
            Self::StorageBucket => "storage-bucket",
            Self::StorageObject => "storage-object",
            Self::ServiceAccount => "service-account",
            Self::VpcConnector => "vpc-connector",
            Self::PubsubTopic => "pubsub-topic",
            Self::SchedulerJob => "scheduler-job",
            Self::CloudFunction => "cloud-function",
            Self::IamBinding => "iam-binding",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Address of a resource inside a plan
///
/// Two resources of the same kind with different names (e.g. two IAM
/// bindings) have distinct addresses.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAddr {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceAddr {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Value that must not show up in logs
///
/// Serializes transparently so the engine receives the real value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sensitive<T>(pub T);

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Sensitive(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketResource {
    pub name: String,
    pub project: String,
    pub location: String,
    pub storage_class: String,
    pub force_destroy: bool,
    pub versioning: bool,
    pub uniform_bucket_level_access: bool,
    pub labels: BTreeMap<String, String>,
    pub depends_on: Vec<ResourceAddr>,
}

/// Source bundle uploaded to the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleObject {
    /// `bundle-<md5>.zip`
    pub name: String,
    pub bucket: String,
    /// Local archive the engine uploads
    pub source: String,
    pub md5: String,
    pub depends_on: Vec<ResourceAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountResource {
    pub account_id: String,
    pub project: String,
    pub display_name: String,
    pub email: String,
    pub depends_on: Vec<ResourceAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcConnectorResource {
    pub name: String,
    /// `projects/<p>/locations/<r>/connectors/<n>`
    pub id: String,
    pub project: String,
    pub region: String,
    pub network: String,
    pub ip_cidr_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    pub depends_on: Vec<ResourceAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicResource {
    pub name: String,
    /// `projects/<p>/topics/<n>`
    pub id: String,
    pub project: String,
    pub labels: BTreeMap<String, String>,
    pub depends_on: Vec<ResourceAddr>,
}

/// Cloud Scheduler job publishing to the schedule topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerJobResource {
    pub name: String,
    pub project: String,
    pub region: String,
    pub schedule: String,
    pub time_zone: String,
    pub topic_name: String,
    /// Base64-encoded message body
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryPolicy>,
    pub depends_on: Vec<ResourceAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunctionSource {
    Repository { url: String },
    Bucket { bucket: String, object: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub event_type: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<RetryPolicy>,
}

/// The compute resource itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResource {
    pub name: String,
    pub project: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub runtime: String,
    pub available_memory_mb: u32,
    pub timeout_secs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    pub entry_point: String,
    pub environment_variables: Sensitive<BTreeMap<String, String>>,
    pub build_environment_variables: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Cloud Functions API value, e.g. `ALLOW_ALL`
    pub ingress_settings: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_connector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_connector_egress_settings: Option<String>,
    pub source: FunctionSource,
    pub trigger_http: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_trigger: Option<EventTrigger>,
    pub depends_on: Vec<ResourceAddr>,
}

/// Authoritative member list for one role on the function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamBindingResource {
    pub function: String,
    pub project: String,
    pub region: String,
    pub role: String,
    pub members: BTreeSet<String>,
    pub depends_on: Vec<ResourceAddr>,
}

/// Borrowed view of one descriptor, in the form handed to the engine
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", content = "resource", rename_all = "kebab-case")]
pub enum ResourceDescriptor<'a> {
    StorageBucket(&'a BucketResource),
    StorageObject(&'a BundleObject),
    ServiceAccount(&'a ServiceAccountResource),
    VpcConnector(&'a VpcConnectorResource),
    PubsubTopic(&'a TopicResource),
    SchedulerJob(&'a SchedulerJobResource),
    CloudFunction(&'a FunctionResource),
    IamBinding(&'a IamBindingResource),
}

impl ResourceDescriptor<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::StorageBucket(_) => ResourceKind::StorageBucket,
            Self::StorageObject(_) => ResourceKind::StorageObject,
            Self::ServiceAccount(_) => ResourceKind::ServiceAccount,
            Self::VpcConnector(_) => ResourceKind::VpcConnector,
            Self::PubsubTopic(_) => ResourceKind::PubsubTopic,
            Self::SchedulerJob(_) => ResourceKind::SchedulerJob,
            Self::CloudFunction(_) => ResourceKind::CloudFunction,
            Self::IamBinding(_) => ResourceKind::IamBinding,
        }
    }

    /// Name the engine keys create-or-update on
    pub fn name(&self) -> String {
        match self {
            Self::StorageBucket(r) => r.name.clone(),
            Self::StorageObject(r) => format!("{}/{}", r.bucket, r.name),
            Self::ServiceAccount(r) => r.account_id.clone(),
            Self::VpcConnector(r) => r.name.clone(),
            Self::PubsubTopic(r) => r.name.clone(),
            Self::SchedulerJob(r) => r.name.clone(),
            Self::CloudFunction(r) => r.name.clone(),
            Self::IamBinding(r) => format!("{}/{}", r.function, r.role),
        }
    }

    pub fn addr(&self) -> ResourceAddr {
        ResourceAddr::new(self.kind(), self.name())
    }

    pub fn depends_on(&self) -> &[ResourceAddr] {
        match self {
            Self::StorageBucket(r) => &r.depends_on,
            Self::StorageObject(r) => &r.depends_on,
            Self::ServiceAccount(r) => &r.depends_on,
            Self::VpcConnector(r) => &r.depends_on,
            Self::PubsubTopic(r) => &r.depends_on,
            Self::SchedulerJob(r) => &r.depends_on,
            Self::CloudFunction(r) => &r.depends_on,
            Self::IamBinding(r) => &r.depends_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_debug_is_redacted() {
        let mut env = BTreeMap::new();
        env.insert("API_KEY".to_string(), "hunter2".to_string());
        let wrapped = Sensitive(env);

        let debug = format!("{:?}", wrapped);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("API_KEY"));

        let json = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(json["API_KEY"], "hunter2");
    }

    #[test]
    fn test_addr_display() {
        let addr = ResourceAddr::new(ResourceKind::PubsubTopic, "jobs-schedule");
        assert_eq!(addr.to_string(), "pubsub-topic.jobs-schedule");
    }

    #[test]
    fn test_function_source_tagging() {
        let source = FunctionSource::Bucket {
            bucket: "b".into(),
            object: "bundle-abc.zip".into(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "bucket");
        assert_eq!(json["object"], "bundle-abc.zip");
    }
}
