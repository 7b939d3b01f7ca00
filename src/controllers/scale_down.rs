use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::exec::{CommandExecutor, ExecRequest};
use super::resources::CONTAINER_NAME;
use crate::api::v1alpha1::{Cassandra, CassandraStatus, ClusterPhase};
use crate::util::errors::{Error, Result, StdError};
use crate::util::metrics::Metrics;

pub const DECOMMISSION_COMMAND: [&str; 2] = ["nodetool", "decommission"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleDown {
    /// Nothing to remove, the workload set may only grow.
    NotNeeded,
    /// The highest member left the ring; replicas may drop to the desired size.
    Authorized,
}

fn refused(message: String) -> Error {
    Error::StdError(StdError::ScaleDownRefused(message))
}

/// Removes at most one member per pass.
///
/// `observed` is the replica count of the live workload set. The Scaling
/// condition doubles as an advisory lock: while it is True no other
/// decommission starts, except to resume the replica decrease of the member
/// that was already decommissioned for the same `(desired, observed)` pair.
/// Once the live replica count reaches the size a Decommissioned condition
/// recorded, the lock is released before anything else is decided.
#[instrument(skip_all, fields(cluster = %cassandra.name_any()))]
pub async fn reconcile_scale_down(
    cassandra: &Cassandra,
    observed: Option<i32>,
    status: &mut CassandraStatus,
    executor: &dyn CommandExecutor,
    metrics: &Metrics,
) -> Result<ScaleDown> {
    let desired = cassandra.spec.size;

    // A decommission whose replica decrease already landed no longer holds the lock.
    if let (Some(observed), Some(recorded)) = (observed, status.decommissioned_size()) {
        if recorded >= observed {
            info!("Scale down to {} completed, releasing the scaling lock", recorded);
            status.set_scaling_complete_condition();
        }
    }

    let observed = match observed {
        Some(observed) if observed > desired => observed,
        _ => return Ok(ScaleDown::NotNeeded),
    };

    if i64::from(observed) - i64::from(desired) > 1 {
        return Err(refused(format!(
            "instance decommission can only be done one by one (observed replicas: {observed}, desired size: {desired})"
        )));
    }

    if status.is_scaling() {
        if status.is_decommissioned(desired, observed) {
            info!("Member {} already decommissioned, resuming scale down", observed - 1);
            return Ok(ScaleDown::Authorized);
        }
        return Err(refused(format!(
            "scaling already in progress, cannot scale from {observed} to {desired}"
        )));
    }

    status.set_scaling_down_condition(desired, observed);

    let victim = cassandra.member_name(observed - 1);
    info!("Decommissioning member '{}'", victim);
    let request = ExecRequest {
        pod: victim.clone(),
        container: CONTAINER_NAME.to_string(),
        namespace: cassandra.namespace().unwrap_or_default(),
        command: DECOMMISSION_COMMAND.iter().map(|s| s.to_string()).collect(),
    };

    match executor.execute(request).await {
        Ok(output) => {
            if !output.stderr.is_empty() {
                warn!("Decommission of '{}' wrote to stderr: {}", victim, output.stderr.trim());
            }
            status.set_decommissioned_condition(desired, observed);
            metrics.decommission(cassandra, "succeeded");
            info!("Member '{}' decommissioned", victim);
            Ok(ScaleDown::Authorized)
        }
        Err(e) => {
            let reason = format!("decommission of {victim} failed: {e}");
            status.set_decommission_failed_condition(&reason);
            status.set_reason(reason);
            status.set_phase(ClusterPhase::Failed);
            metrics.decommission(cassandra, "failed");
            Err(e)
        }
    }
}
