//! cloudfn-plan
//!
//! Resolves a Cloud Functions deployment (function, optional source bucket,
//! optional runtime identity, optional VPC egress, optional trigger, IAM
//! bindings) into a fully referenced resource plan for a provisioning engine.
//!
//! Public API:
//! - `DeploymentSpec::from_file()` - load a deployment
//! - `resolve()` - validate, derive, select the trigger, package, emit
//! - `hand_off()` - pass a plan to a `ProvisioningEngine` in dependency order

pub mod bundle;
pub mod config;
pub mod deployment;
pub mod engine;
pub mod error;
pub mod gcp;
pub mod plan;
pub mod resolve;
pub mod resource;
pub mod trigger;

pub use crate::bundle::{Packager, ZipPackager};
pub use crate::deployment::DeploymentSpec;
pub use crate::engine::{hand_off, DryRunEngine, ProvisioningEngine};
pub use crate::error::PlanError;
pub use crate::plan::resources::{ResourceAddr, ResourceDescriptor, ResourceKind};
pub use crate::plan::{resolve, ResolvedPlan};
pub use crate::trigger::TriggerMode;
