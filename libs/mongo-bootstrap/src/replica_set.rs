//! Replica-set stage: one-shot initiation followed by a bounded wait for a primary.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admin::AdminChannel;
use crate::error::ProvisionError;
use crate::topology::{MemberStatus, ReplicaSetConfig};

/// How long to poll for an elected primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryWaitPolicy {
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts.
    pub interval: Duration,
}

impl Default for PrimaryWaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

impl PrimaryWaitPolicy {
    /// Upper bound of time spent sleeping before giving up.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetPlan {
    pub topology: ReplicaSetConfig,
    pub wait: PrimaryWaitPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaSetReadiness {
    /// The status query succeeded; nothing was sent.
    AlreadyInitialized,
    /// The status query failed and the initiate command was accepted.
    Initiated,
}

/// Make sure the replica set exists.
///
/// A successful status query means the set is already initiated and is left alone.
/// A failed query is read as "not initiated yet" and triggers exactly one initiate
/// with `topology`.
///
/// # Errors
/// Returns [`ProvisionError::ReplicaSetInitiationFailed`] if the initiate command fails.
pub async fn ensure_replica_set_ready<A>(
    admin: &A,
    topology: &ReplicaSetConfig,
) -> Result<ReplicaSetReadiness, ProvisionError>
where
    A: AdminChannel + ?Sized,
{
    match admin.replica_set_status().await {
        Ok(status) => {
            if status.ok {
                info!(set_name = ?status.set_name, "Replica set is already initialized");
            } else {
                warn!(set_name = ?status.set_name, "Replica set status is not ok; not re-initiating");
            }
            Ok(ReplicaSetReadiness::AlreadyInitialized)
        }
        Err(err) => {
            info!(
                set_name = %topology.set_name,
                members = topology.members.len(),
                reason = %err,
                "Initializing replica set"
            );
            admin
                .initiate_replica_set(topology)
                .await
                .map_err(|source| ProvisionError::ReplicaSetInitiationFailed {
                    set_name: topology.set_name.clone(),
                    source,
                })?;
            info!(set_name = %topology.set_name, "Replica set initiated");
            Ok(ReplicaSetReadiness::Initiated)
        }
    }
}

/// Poll the replica-set status until a member reports PRIMARY.
///
/// Makes at most `policy.max_attempts` status queries with `policy.interval` between
/// them. Query errors count as attempts. `cancel` interrupts the sleep.
///
/// # Errors
/// Returns [`ProvisionError::PrimaryElectionTimeout`] when attempts run out and
/// [`ProvisionError::Cancelled`] when `cancel` fires first.
pub async fn wait_for_primary<A>(
    admin: &A,
    policy: &PrimaryWaitPolicy,
    cancel: &CancellationToken,
) -> Result<MemberStatus, ProvisionError>
where
    A: AdminChannel + ?Sized,
{
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        match admin.replica_set_status().await {
            Ok(status) => {
                if let Some(primary) = status.primary() {
                    info!(
                        host = %primary.host,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Primary found"
                    );
                    return Ok(primary.clone());
                }
                debug!(attempt, members = status.members.len(), "No primary yet");
            }
            Err(err) => {
                debug!(attempt, error = %err, "Replica set status unavailable");
            }
        }

        if attempt < policy.max_attempts {
            info!(attempt, max_attempts = policy.max_attempts, "Waiting for primary...");
            tokio::select! {
                () = cancel.cancelled() => return Err(ProvisionError::Cancelled),
                () = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    let waited = started.elapsed();
    warn!(
        attempts = policy.max_attempts,
        waited_ms = waited.as_millis(),
        "Timed out waiting for primary election"
    );
    Err(ProvisionError::PrimaryElectionTimeout {
        attempts: policy.max_attempts,
        waited,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryAdmin;

    fn fast_policy(max_attempts: u32) -> PrimaryWaitPolicy {
        PrimaryWaitPolicy {
            max_attempts,
            interval: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn healthy_set_is_not_reinitiated() {
        let admin = InMemoryAdmin::new();
        let readiness = ensure_replica_set_ready(&admin, &ReplicaSetConfig::default())
            .await
            .unwrap();
        assert_eq!(readiness, ReplicaSetReadiness::AlreadyInitialized);
        assert!(admin.calls().initiations.is_empty());
    }

    #[tokio::test]
    async fn status_not_ok_is_left_alone() {
        let admin = InMemoryAdmin::degraded();
        let readiness = ensure_replica_set_ready(&admin, &ReplicaSetConfig::default())
            .await
            .unwrap();
        assert_eq!(readiness, ReplicaSetReadiness::AlreadyInitialized);

        let calls = admin.calls();
        assert_eq!(calls.status_queries, 1);
        assert!(calls.initiations.is_empty());
    }

    #[tokio::test]
    async fn uninitialized_set_is_initiated_once_with_default_members() {
        let admin = InMemoryAdmin::uninitialized(0);
        let readiness = ensure_replica_set_ready(&admin, &ReplicaSetConfig::default())
            .await
            .unwrap();
        assert_eq!(readiness, ReplicaSetReadiness::Initiated);

        let calls = admin.calls();
        assert_eq!(calls.initiations.len(), 1);
        let hosts: Vec<_> = calls.initiations[0]
            .members
            .iter()
            .map(|m| m.host.split('.').next().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(hosts, ["shared-mongodb-0", "shared-mongodb-1"]);
    }

    #[tokio::test]
    async fn initiate_failure_is_reported() {
        let admin = InMemoryAdmin::uninitialized(0).failing_initiate();
        let err = ensure_replica_set_ready(&admin, &ReplicaSetConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ReplicaSetInitiationFailed { .. }));
        assert!(err.is_stage_fatal());
        assert_eq!(admin.calls().initiations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_found_after_election_polls() {
        let admin = InMemoryAdmin::uninitialized(3);
        ensure_replica_set_ready(&admin, &ReplicaSetConfig::default())
            .await
            .unwrap();

        let primary = wait_for_primary(&admin, &fast_policy(30), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(primary.id, 0);
        // First status query came from ensure_replica_set_ready; three more polls
        // report an election in progress.
        assert_eq!(admin.calls().status_queries, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn never_elected_primary_times_out_within_bound() {
        let admin = InMemoryAdmin::new().never_elects();
        let policy = fast_policy(5);

        let started = Instant::now();
        let err = wait_for_primary(&admin, &policy, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::PrimaryElectionTimeout { attempts: 5, .. }
        ));
        assert!(started.elapsed() <= policy.interval * policy.max_attempts);
        assert_eq!(started.elapsed(), policy.max_wait());
        assert_eq!(admin.calls().status_queries, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn status_errors_count_as_attempts() {
        let admin = InMemoryAdmin::uninitialized(0);
        let err = wait_for_primary(&admin, &fast_policy(3), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::PrimaryElectionTimeout { .. }));
        assert_eq!(admin.calls().status_queries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let admin = InMemoryAdmin::new().never_elects();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = wait_for_primary(&admin, &fast_policy(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled));
        assert!(admin.calls().status_queries < 30);
    }

    #[test]
    fn max_wait_excludes_trailing_sleep() {
        assert_eq!(fast_policy(30).max_wait(), Duration::from_secs(58));
        assert_eq!(fast_policy(1).max_wait(), Duration::ZERO);
    }
}
