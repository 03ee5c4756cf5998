//! Deletion convergence
//!
//! A deleted object is only considered gone once the cluster stops
//! returning it. Each deletion walks
//! `Requested -> DeleteIssued -> Polling -> Confirmed | TimedOut | Failed`.

use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::{ClusterGateway, GatewayError, ObjectRef};

/// Progress of a single deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Requested,
    DeleteIssued,
    Polling,
    Confirmed,
    TimedOut,
    Failed,
}

impl fmt::Display for DeletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeletionState::Requested => "requested",
            DeletionState::DeleteIssued => "delete-issued",
            DeletionState::Polling => "polling",
            DeletionState::Confirmed => "confirmed",
            DeletionState::TimedOut => "timed-out",
            DeletionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a not-found answer to the delete call itself means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingObject {
    /// Deleting something absent is an error
    Fail,
    /// Absent already counts as deleted
    Confirm,
}

/// Issues deletes and waits for them to converge
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl Convergence {
    /// `timeout` of `None` waits until the object is gone
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Delete `object` and wait until it is no longer observable
    pub async fn delete_and_confirm(
        &self,
        gateway: &dyn ClusterGateway,
        object: &ObjectRef,
        missing: MissingObject,
    ) -> TenancyResult<DeletionState> {
        let mut state = DeletionState::Requested;
        debug!(object = %object, state = %state, "Deletion requested");

        match gateway.delete(object).await {
            Ok(()) => advance(object, &mut state, DeletionState::DeleteIssued),
            Err(GatewayError::NotFound(_)) if missing == MissingObject::Confirm => {
                advance(object, &mut state, DeletionState::Confirmed);
                return Ok(state);
            }
            Err(e) => {
                advance(object, &mut state, DeletionState::Failed);
                return Err(e.into());
            }
        }

        advance(object, &mut state, DeletionState::Polling);
        let wait = gateway.await_removal(object, self.poll_interval);

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    advance(object, &mut state, DeletionState::TimedOut);
                    return Err(TenancyError::ConvergenceTimeout {
                        object: object.clone(),
                        after: limit,
                    });
                }
            },
            None => wait.await,
        };

        match outcome {
            Ok(()) => {
                advance(object, &mut state, DeletionState::Confirmed);
                Ok(state)
            }
            Err(e) => {
                advance(object, &mut state, DeletionState::Failed);
                Err(e.into())
            }
        }
    }
}

fn advance(object: &ObjectRef, state: &mut DeletionState, next: DeletionState) {
    debug!(object = %object, from = %state, to = %next, "Deletion state changed");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::memory::InMemoryGateway;
    use k8s_openapi::api::core::v1::Pod;

    fn seeded() -> (InMemoryGateway, ObjectRef) {
        let gateway = InMemoryGateway::new();
        gateway.add_namespace("acme-n1");
        let mut pod = Pod::default();
        pod.metadata.name = Some("p1".to_string());
        pod.metadata.namespace = Some("acme-n1".to_string());
        gateway.seed(pod);
        (gateway, ObjectRef::pod("acme-n1", "p1"))
    }

    fn convergence() -> Convergence {
        Convergence::new(Duration::from_millis(250), Some(Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_after_object_disappears() {
        let (gateway, pod) = seeded();
        gateway.linger_after_delete(pod.clone(), 3);

        let state = convergence()
            .delete_and_confirm(&gateway, &pod, MissingObject::Fail)
            .await
            .unwrap();
        assert_eq!(state, DeletionState::Confirmed);
        assert!(!gateway.contains(&pod));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_object_never_goes_away() {
        let (gateway, pod) = seeded();
        gateway.never_remove(pod.clone());

        let err = convergence()
            .delete_and_confirm(&gateway, &pod, MissingObject::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::ConvergenceTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_is_not_gone() {
        let (gateway, pod) = seeded();
        gateway.linger_after_delete(pod.clone(), 1);
        gateway.fail_get(pod.clone());

        let err = convergence()
            .delete_and_confirm(&gateway, &pod, MissingObject::Fail)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenancyError::Gateway(GatewayError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_object_policy() {
        let gateway = InMemoryGateway::new();
        let absent = ObjectRef::namespace("acme-n9");

        let state = convergence()
            .delete_and_confirm(&gateway, &absent, MissingObject::Confirm)
            .await
            .unwrap();
        assert_eq!(state, DeletionState::Confirmed);

        let err = convergence()
            .delete_and_confirm(&gateway, &absent, MissingObject::Fail)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_delete_skips_polling() {
        let (gateway, pod) = seeded();
        gateway.fail_delete(pod.clone());

        assert!(convergence()
            .delete_and_confirm(&gateway, &pod, MissingObject::Fail)
            .await
            .is_err());
        assert!(gateway
            .calls()
            .iter()
            .all(|c| !matches!(c, crate::kubernetes::memory::GatewayCall::Get(_))));
    }
}
