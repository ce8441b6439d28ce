//! Plan errors
//!
//! Every configuration problem is reported before a plan exists; a plan is
//! never partially emitted.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    /// Two mutually exclusive option groups are both set, or a derived value
    /// resolved to nothing where something is required.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("duplicate IAM role in bindings: {role}")]
    DuplicateKey { role: String },

    /// A descriptor points at a resource the plan does not contain.
    /// This is an internal invariant violation, not a user error.
    #[error("internal error: {from} references {to}, which is not in the plan")]
    UnresolvedReference { from: String, to: String },

    #[error("invalid {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("failed to parse deployment: {0}")]
    Parse(String),

    #[error("packaging failed: {0}")]
    Packaging(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Opaque failure reported by the provisioning engine.
    #[error("provisioning engine error")]
    Engine(#[source] anyhow::Error),
}

impl PlanError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConfigurationConflict(msg.into())
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the deployment input rather than by I/O or
    /// the engine.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationConflict(_) | Self::DuplicateKey { .. } | Self::ValidationFailed { .. }
        )
    }
}

/// Walk the full error chain and join all causes into one string.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_err_chain_includes_engine_cause() {
        let err = PlanError::Engine(anyhow::anyhow!("quota exceeded"));
        assert_eq!(format_err_chain(&err), "provisioning engine error: quota exceeded");
    }

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(PlanError::conflict("x").is_configuration_error());
        assert!(PlanError::DuplicateKey { role: "roles/viewer".into() }.is_configuration_error());
        assert!(!PlanError::UnresolvedReference {
            from: "a".into(),
            to: "b".into()
        }
        .is_configuration_error());
    }
}
