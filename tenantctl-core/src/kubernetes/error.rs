//! Cluster gateway error types
//!
//! Maps kube-rs errors onto the few outcomes callers branch on: not found,
//! already exists and write conflicts. Everything else is passed through.

use super::{ObjectKind, ObjectRef};
use thiserror::Error;

/// Errors returned by a [`ClusterGateway`](super::ClusterGateway)
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Object is not (or no longer) observable
    #[error("{0} not found")]
    NotFound(ObjectRef),

    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    /// Replace carried a stale resourceVersion
    #[error("Conflict: {0} was modified concurrently")]
    Conflict(ObjectRef),

    /// Error from kube-rs client
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),

    /// Invalid kubeconfig
    #[error("Invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    /// Watch stream error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Control plane could not be reached
    #[error("Cluster unavailable: {0}")]
    Unavailable(String),

    /// Request could not be expressed against the API
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Expected a {expected}, got a {actual}")]
    UnexpectedKind {
        expected: ObjectKind,
        actual: ObjectKind,
    },
}

impl GatewayError {
    /// Classify a kube-rs error raised while working on `object`
    pub fn from_kube(err: kube::Error, object: &ObjectRef) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 404 => {
                GatewayError::NotFound(object.clone())
            }
            kube::Error::Api(response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                GatewayError::AlreadyExists(object.clone())
            }
            kube::Error::Api(response) if response.code == 409 => {
                GatewayError::Conflict(object.clone())
            }
            _ => GatewayError::Api(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict(_))
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_status_codes_are_classified() {
        let pod = ObjectRef::namespaced(ObjectKind::Pod, "acme-n1", "p1");

        assert!(GatewayError::from_kube(api_error(404, "NotFound"), &pod).is_not_found());
        assert!(GatewayError::from_kube(api_error(409, "Conflict"), &pod).is_conflict());
        assert!(matches!(
            GatewayError::from_kube(api_error(409, "AlreadyExists"), &pod),
            GatewayError::AlreadyExists(_)
        ));
        assert!(matches!(
            GatewayError::from_kube(api_error(403, "Forbidden"), &pod),
            GatewayError::Api(_)
        ));
    }

    #[test]
    fn test_not_found_message_names_the_object() {
        let pod = ObjectRef::namespaced(ObjectKind::Pod, "acme-n1", "p1");
        assert_eq!(
            GatewayError::NotFound(pod).to_string(),
            "pod acme-n1/p1 not found"
        );
    }
}
