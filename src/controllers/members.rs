use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use super::resources::selector;
use super::store::ObjectStore;
use crate::api::v1alpha1::{Cassandra, CassandraStatus};
use crate::util::errors::Result;

/// Names of the pods currently carrying the cluster labels, in listing order.
pub async fn list_members(cassandra: &Cassandra, pods: &dyn ObjectStore<Pod>) -> Result<Vec<String>> {
    let ns = cassandra.namespace().unwrap_or_default();
    let pods = pods.list(&ns, &selector(&cassandra.name_any())).await?;
    Ok(pods.iter().map(|pod| pod.name_any()).collect())
}

/// Records the observed members; returns whether the list changed.
pub fn update_members(status: &mut CassandraStatus, members: Vec<String>) -> bool {
    if status.members == members {
        return false;
    }
    status.members = members;
    true
}
