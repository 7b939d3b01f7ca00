use k8s_openapi::api::apps::v1::{RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetUpdateStrategy};
use kube::ResourceExt;
use tracing::info;

use super::resources::{
    image_of, owner_reference, partition_of, replicas_of, statefulset, version_of, CONTAINER_NAME,
};
use super::store::ObjectStore;
use crate::api::v1alpha1::Cassandra;
use crate::util::errors::Result;

/// Replica count of the existing workload set, `None` when it does not exist yet.
pub async fn observed_replicas(
    cassandra: &Cassandra,
    statefulsets: &dyn ObjectStore<StatefulSet>,
) -> Result<Option<i32>> {
    let ns = cassandra.namespace().unwrap_or_default();
    Ok(statefulsets
        .get(&ns, &cassandra.name_any())
        .await?
        .map(|sts| replicas_of(&sts)))
}

/// Converges the owned fields of the workload set: image, partition and replicas.
///
/// Replicas only go down when `allow_decrease` is set, which the scale-down
/// orchestrator does after a successful decommission. Returns the version tag
/// running before any change was applied.
pub async fn reconcile_statefulset(
    cassandra: &Cassandra,
    statefulsets: &dyn ObjectStore<StatefulSet>,
    allow_decrease: bool,
) -> Result<String> {
    let ns = cassandra.namespace().unwrap_or_default();
    let name = cassandra.name_any();

    let existing = match statefulsets.get(&ns, &name).await? {
        Some(existing) => existing,
        None => {
            let oref = owner_reference(cassandra)?;
            info!("Creating StatefulSet '{}' in namespace '{}'", name, ns);
            match statefulsets.create(&statefulset(cassandra, &oref)).await {
                Ok(_) => {}
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
            return Ok(cassandra.spec.version.clone());
        }
    };

    let observed_version = image_of(&existing)
        .map(|image| version_of(&image))
        .unwrap_or_default();

    let current = replicas_of(&existing);
    let desired = cassandra.spec.size;
    let replicas = if desired > current || (desired < current && allow_decrease) {
        desired
    } else {
        current
    };
    let image = cassandra.image();
    let partition = cassandra.spec.partition;

    let needs_update = replicas != current
        || image_of(&existing).as_deref() != Some(image.as_str())
        || partition_of(&existing) != Some(partition);
    if !needs_update {
        info!("StatefulSet '{}' is up to date", name);
        return Ok(observed_version);
    }

    info!(
        "Updating StatefulSet '{}': replicas {} -> {}, image {}, partition {}",
        name, current, replicas, image, partition
    );
    let mut updated = existing;
    if let Some(spec) = updated.spec.as_mut() {
        spec.replicas = Some(replicas);
        spec.update_strategy = Some(StatefulSetUpdateStrategy {
            type_: Some("RollingUpdate".to_string()),
            rolling_update: Some(RollingUpdateStatefulSetStrategy {
                partition: Some(partition),
                ..Default::default()
            }),
        });
        if let Some(pod) = spec.template.spec.as_mut() {
            for container in pod.containers.iter_mut().filter(|c| c.name == CONTAINER_NAME) {
                container.image = Some(image.clone());
            }
        }
    }
    statefulsets.replace(&updated).await?;

    Ok(observed_version)
}
