use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::info;

use super::resources::{headless_service, owner_reference, service_ports};
use super::store::ObjectStore;
use crate::api::v1alpha1::Cassandra;
use crate::util::errors::Result;

/// Ensures the headless service of the cluster exists with the expected ports.
pub async fn reconcile_service(cassandra: &Cassandra, services: &dyn ObjectStore<Service>) -> Result<()> {
    let ns = cassandra.namespace().unwrap_or_default();
    let name = cassandra.service_name();

    match services.get(&ns, &name).await? {
        None => {
            let oref = owner_reference(cassandra)?;
            info!("Creating Service '{}' in namespace '{}'", name, ns);
            match services.create(&headless_service(cassandra, &oref)).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) => Err(e),
            }
        }
        Some(existing) => {
            let desired = service_ports();
            if ports_match(&existing, &desired) {
                return Ok(());
            }
            info!("Updating ports of Service '{}'", name);
            let mut updated = existing;
            if let Some(spec) = updated.spec.as_mut() {
                spec.ports = Some(desired);
            }
            services.replace(&updated).await?;
            Ok(())
        }
    }
}

// The API server fills defaults (node ports, app protocol), so only compare what we set.
fn ports_match(existing: &Service, desired: &[ServicePort]) -> bool {
    let current = existing
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or_default();

    current.len() == desired.len() && current.iter().zip(desired).all(|(a, b)| same_port(a, b))
}

fn same_port(a: &ServicePort, b: &ServicePort) -> bool {
    let target = |p: &ServicePort| p.target_port.clone().unwrap_or(IntOrString::Int(p.port));
    let protocol = |p: &ServicePort| p.protocol.clone().unwrap_or_else(|| "TCP".to_string());

    a.name == b.name && a.port == b.port && target(a) == target(b) && protocol(a) == protocol(b)
}
