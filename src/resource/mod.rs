//! Resource kind catalog
//!
//! Resource kinds are described in JSON files under `src/resources/`,
//! embedded at compile time:
//! - `kinds.json` - Every kind a plan can hand to the provisioning engine
//!
//! # Example
//!
//! ```ignore
//! use crate::resource::get_kind_def;
//!
//! let def = get_kind_def("pubsub-topic").unwrap();
//! assert_eq!(def.service, "pubsub.googleapis.com");
//! ```

mod registry;

pub use registry::*;
