//! GCP naming helpers
//!
//! - [`region`] - Region alias canonicalization
//! - [`project`] - Project/region discovery from the gcloud environment

pub mod project;
pub mod region;

pub use region::canonicalize;
