//! Error types for the VM operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The VirtualMachineClass referenced by a VM does not exist (yet).
    ///
    /// Retryable: the class may be created after the VM that references it,
    /// so the error policy requeues rather than giving up.
    #[error("virtual machine class {0:?} not found")]
    ClassNotFound(String),

    /// VM state lookup failed for an infrastructure reason.
    ///
    /// Distinct from "the VM does not exist", which is a normal validation
    /// outcome recorded in status conditions, not an error.
    #[error("vm lookup error: {0}")]
    VmLookup(String),
}

impl Error {
    /// Create a VM lookup error with the given message
    pub fn vm_lookup(msg: impl Into<String>) -> Self {
        Self::VmLookup(msg.into())
    }
}

/// Whether a Kubernetes API error means the requested object does not exist
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Whether a Kubernetes API error is a create collision with an existing object
///
/// The API server reports this as a 409 with reason `AlreadyExists`. For a
/// create-if-absent path this is a benign race outcome, not a failure.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists")
}

/// Whether a Kubernetes API error is an optimistic-concurrency conflict
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("test {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: A VM references a class that has not been created yet
    ///
    /// The pinner surfaces this as ClassNotFound so the error policy keeps
    /// retrying; the class may legitimately appear later.
    #[test]
    fn story_missing_class_is_a_named_retryable_error() {
        let err = Error::ClassNotFound("small".to_string());
        assert!(err.to_string().contains("small"));
        assert!(err.to_string().contains("not found"));

        match err {
            Error::ClassNotFound(name) => assert_eq!(name, "small"),
            _ => panic!("Expected ClassNotFound variant"),
        }
    }

    /// Story: Two reconciliations race to create the same class instance
    ///
    /// The loser sees a 409 AlreadyExists from the API server. The helper
    /// classifies it so the pinner can treat the race as success.
    #[test]
    fn story_create_race_is_detected_as_already_exists() {
        let err = api_error(409, "AlreadyExists");
        assert!(is_already_exists(&err));
        assert!(is_conflict(&err));
        assert!(!is_not_found(&err));
    }

    /// Story: An update collides with a concurrent writer
    ///
    /// Plain 409 conflicts (resourceVersion mismatch) are conflicts but not
    /// AlreadyExists, so create-path handling does not apply.
    #[test]
    fn story_resource_version_conflict_is_not_already_exists() {
        let err = api_error(409, "Conflict");
        assert!(is_conflict(&err));
        assert!(!is_already_exists(&err));
    }

    /// Story: Looking up an absent object yields 404
    #[test]
    fn story_not_found_is_classified() {
        let err = api_error(404, "NotFound");
        assert!(is_not_found(&err));
        assert!(!is_conflict(&err));
    }

    /// Story: Transient lookup failures carry context for the retry loop
    #[test]
    fn story_vm_lookup_error_construction() {
        let err = Error::vm_lookup(format!("listing virtualmachines in {}", "team-a"));
        assert!(err.to_string().contains("vm lookup error"));
        assert!(err.to_string().contains("team-a"));
    }
}
