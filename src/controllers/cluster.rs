use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::exec::CommandExecutor;
use super::members::{list_members, update_members};
use super::scale_down::{reconcile_scale_down, ScaleDown};
use super::service::reconcile_service;
use super::statefulset::{observed_replicas, reconcile_statefulset};
use super::store::Stores;
use crate::api::v1alpha1::{Cassandra, CassandraStatus, ClusterPhase};
use crate::util::errors::{Error, Result};
use crate::util::metrics::Metrics;

/// The subsystems of a reconcile pass, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStep {
    Validation,
    Service,
    Members,
    StatefulSet,
    Status,
}

impl ReconcileStep {
    pub const ALL: [ReconcileStep; 5] = [
        ReconcileStep::Validation,
        ReconcileStep::Service,
        ReconcileStep::Members,
        ReconcileStep::StatefulSet,
        ReconcileStep::Status,
    ];
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconcileStep::Validation => write!(f, "validation"),
            ReconcileStep::Service => write!(f, "service"),
            ReconcileStep::Members => write!(f, "members"),
            ReconcileStep::StatefulSet => write!(f, "statefulset"),
            ReconcileStep::Status => write!(f, "status"),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReconcileSteps: Send {
    /// Applies defaults to the working copy, returns whether anything changed.
    fn set_defaults(&mut self) -> bool;

    /// Refuses a spec no pass can act on, before anything is touched.
    fn validate(&self) -> Result<()>;

    async fn reconcile_service(&mut self) -> Result<()>;

    /// Scale-down orchestration followed by membership tracking.
    async fn reconcile_members(&mut self) -> Result<()>;

    async fn reconcile_statefulset(&mut self) -> Result<()>;

    async fn reconcile_status(&mut self) -> Result<()>;

    /// Records the failure on the cluster and returns the error to propagate.
    async fn failed_reconciliation(&mut self, step: ReconcileStep, error: Error) -> Error;
}

/// Runs one reconcile pass. Steps run in order and the first failure ends the pass.
pub async fn reconcile_cluster<S>(steps: Option<&mut S>) -> Result<()>
where
    S: ReconcileSteps + ?Sized,
{
    let steps = steps.ok_or(Error::MissingTarget)?;

    if steps.set_defaults() {
        debug!("Applied defaults to the cluster spec");
    }

    for step in ReconcileStep::ALL {
        let result = match step {
            ReconcileStep::Validation => steps.validate(),
            ReconcileStep::Service => steps.reconcile_service().await,
            ReconcileStep::Members => steps.reconcile_members().await,
            ReconcileStep::StatefulSet => steps.reconcile_statefulset().await,
            ReconcileStep::Status => steps.reconcile_status().await,
        };
        if let Err(e) = result {
            return Err(steps.failed_reconciliation(step, e).await);
        }
    }
    Ok(())
}

/// Reconcile steps bound to one live `Cassandra` object.
pub struct ClusterReconciler {
    cassandra: Cassandra,
    status: CassandraStatus,
    persisted: CassandraStatus,
    stores: Stores,
    executor: Arc<dyn CommandExecutor>,
    metrics: Metrics,
    allow_decrease: bool,
    started_scaling: bool,
    observed_version: Option<String>,
}

impl ClusterReconciler {
    pub fn new(
        cassandra: &Cassandra,
        stores: Stores,
        executor: Arc<dyn CommandExecutor>,
        metrics: Metrics,
    ) -> Self {
        let persisted = cassandra.status.clone().unwrap_or_default();
        let mut status = persisted.clone();
        if status.phase.is_none() {
            status.set_phase(ClusterPhase::Creating);
        }

        ClusterReconciler {
            cassandra: cassandra.clone(),
            started_scaling: persisted.is_scaling(),
            status,
            persisted,
            stores,
            executor,
            metrics,
            allow_decrease: false,
            observed_version: None,
        }
    }

    pub fn status(&self) -> &CassandraStatus {
        &self.status
    }

    /// Writes the status subresource when it differs from what was last stored.
    async fn persist_status(&mut self) -> Result<()> {
        if self.status == self.persisted {
            return Ok(());
        }
        let mut object = self.cassandra.clone();
        object.status = Some(self.status.clone());
        self.stores.clusters.patch_status(&object).await?;
        self.persisted = self.status.clone();
        Ok(())
    }
}

#[async_trait]
impl ReconcileSteps for ClusterReconciler {
    fn set_defaults(&mut self) -> bool {
        self.cassandra.set_defaults()
    }

    fn validate(&self) -> Result<()> {
        self.cassandra.validate().map_err(Error::StdError)
    }

    async fn reconcile_service(&mut self) -> Result<()> {
        reconcile_service(&self.cassandra, self.stores.services.as_ref()).await
    }

    async fn reconcile_members(&mut self) -> Result<()> {
        let observed = observed_replicas(&self.cassandra, self.stores.statefulsets.as_ref()).await?;
        let outcome = reconcile_scale_down(
            &self.cassandra,
            observed,
            &mut self.status,
            self.executor.as_ref(),
            &self.metrics,
        )
        .await?;
        self.allow_decrease = outcome == ScaleDown::Authorized;

        let members = list_members(&self.cassandra, self.stores.pods.as_ref()).await?;
        update_members(&mut self.status, members);
        self.persist_status().await
    }

    async fn reconcile_statefulset(&mut self) -> Result<()> {
        let version = reconcile_statefulset(
            &self.cassandra,
            self.stores.statefulsets.as_ref(),
            self.allow_decrease,
        )
        .await?;
        self.observed_version = Some(version);
        Ok(())
    }

    async fn reconcile_status(&mut self) -> Result<()> {
        let spec_version = self.cassandra.spec.version.clone();
        let current_version = self
            .observed_version
            .clone()
            .unwrap_or_else(|| spec_version.clone());

        if self.status.is_failed() {
            info!(
                "Cluster recovered from failure: {}",
                self.status.reason.as_deref().unwrap_or("unknown")
            );
        }
        self.status.set_phase(ClusterPhase::Running);
        self.status.clear_reason();
        self.status.set_available_condition();
        self.status.size = self.status.members.len() as i32;
        self.status.target_version = if spec_version != current_version {
            spec_version
        } else {
            String::new()
        };
        self.status.current_version = current_version;

        if self.started_scaling && self.status.is_scaling() {
            let observed = observed_replicas(&self.cassandra, self.stores.statefulsets.as_ref()).await?;
            if observed == Some(self.cassandra.spec.size) {
                self.status.set_scaling_complete_condition();
            }
        }

        self.persist_status().await
    }

    async fn failed_reconciliation(&mut self, step: ReconcileStep, error: Error) -> Error {
        let ns = self.cassandra.namespace().unwrap_or_default();
        let error = Error::step_failed(&ns, &self.cassandra.name_any(), step, error);

        self.status.set_reason(error.to_string());
        self.status.set_phase(ClusterPhase::Failed);
        if let Err(e) = self.persist_status().await {
            warn!("Failed to record failure of {} step: {}", step, e);
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::errors::StdError;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn boom(step: &str) -> Error {
        Error::StdError(StdError::MetadataMissing(format!("{step} failed")))
    }

    #[tokio::test]
    async fn missing_target_fails_immediately() {
        let err = reconcile_cluster::<MockReconcileSteps>(None).await.unwrap_err();
        assert!(matches!(err, Error::MissingTarget));
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let mut seq = Sequence::new();
        let mut steps = MockReconcileSteps::new();
        steps
            .expect_set_defaults()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| false);
        steps
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        steps
            .expect_reconcile_service()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        steps
            .expect_reconcile_members()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        steps
            .expect_reconcile_statefulset()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        steps
            .expect_reconcile_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        steps.expect_failed_reconciliation().never();

        reconcile_cluster(Some(&mut steps)).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_cluster_touches_nothing() {
        let mut steps = MockReconcileSteps::new();
        steps.expect_set_defaults().returning(|| false);
        steps
            .expect_validate()
            .returning(|| Err(Error::StdError(StdError::InvalidSpec("size must not be negative, got -1".to_string()))));
        steps.expect_reconcile_service().never();
        steps.expect_reconcile_members().never();
        steps.expect_reconcile_statefulset().never();
        steps.expect_reconcile_status().never();
        steps
            .expect_failed_reconciliation()
            .with(eq(ReconcileStep::Validation), mockall::predicate::always())
            .times(1)
            .returning(|step, e| Error::step_failed("default", "example", step, e));

        let err = reconcile_cluster(Some(&mut steps)).await.unwrap_err();
        assert_eq!(err.metric_label(), "invalidspec");
        assert!(err.to_string().starts_with("default/example: validation reconcile failed"));
    }

    #[tokio::test]
    async fn service_failure_stops_the_pass() {
        let mut steps = MockReconcileSteps::new();
        steps.expect_set_defaults().returning(|| false);
        steps.expect_validate().returning(|| Ok(()));
        steps
            .expect_reconcile_service()
            .returning(|| Err(boom("service")));
        steps.expect_reconcile_members().never();
        steps.expect_reconcile_statefulset().never();
        steps.expect_reconcile_status().never();
        steps
            .expect_failed_reconciliation()
            .with(eq(ReconcileStep::Service), mockall::predicate::always())
            .times(1)
            .returning(|step, e| Error::step_failed("default", "example", step, e));

        let err = reconcile_cluster(Some(&mut steps)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "default/example: service reconcile failed: Standard Error: MetadataMissing: service failed"
        );
    }

    #[tokio::test]
    async fn members_failure_stops_the_pass() {
        let mut steps = MockReconcileSteps::new();
        steps.expect_set_defaults().returning(|| false);
        steps.expect_validate().returning(|| Ok(()));
        steps.expect_reconcile_service().returning(|| Ok(()));
        steps
            .expect_reconcile_members()
            .returning(|| Err(boom("members")));
        steps.expect_reconcile_statefulset().never();
        steps.expect_reconcile_status().never();
        steps
            .expect_failed_reconciliation()
            .with(eq(ReconcileStep::Members), mockall::predicate::always())
            .times(1)
            .returning(|_, e| e);

        let err = reconcile_cluster(Some(&mut steps)).await.unwrap_err();
        assert!(err.to_string().contains("members failed"));
    }

    #[tokio::test]
    async fn statefulset_failure_stops_the_pass() {
        let mut steps = MockReconcileSteps::new();
        steps.expect_set_defaults().returning(|| true);
        steps.expect_validate().returning(|| Ok(()));
        steps.expect_reconcile_service().returning(|| Ok(()));
        steps.expect_reconcile_members().returning(|| Ok(()));
        steps
            .expect_reconcile_statefulset()
            .returning(|| Err(boom("statefulset")));
        steps.expect_reconcile_status().never();
        steps
            .expect_failed_reconciliation()
            .with(eq(ReconcileStep::StatefulSet), mockall::predicate::always())
            .times(1)
            .returning(|_, e| e);

        assert!(reconcile_cluster(Some(&mut steps)).await.is_err());
    }

    #[tokio::test]
    async fn status_failure_is_reported() {
        let mut steps = MockReconcileSteps::new();
        steps.expect_set_defaults().returning(|| false);
        steps.expect_validate().returning(|| Ok(()));
        steps.expect_reconcile_service().returning(|| Ok(()));
        steps.expect_reconcile_members().returning(|| Ok(()));
        steps.expect_reconcile_statefulset().returning(|| Ok(()));
        steps
            .expect_reconcile_status()
            .returning(|| Err(boom("status")));
        steps
            .expect_failed_reconciliation()
            .with(eq(ReconcileStep::Status), mockall::predicate::always())
            .times(1)
            .returning(|_, e| e);

        let err = reconcile_cluster(Some(&mut steps)).await.unwrap_err();
        assert!(err.to_string().contains("status failed"));
    }
}
