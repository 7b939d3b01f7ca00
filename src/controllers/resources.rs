use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{
            RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
        },
        core::v1::{
            Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, Lifecycle,
            LifecycleHandler, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec,
            PodSpec, PodTemplateSpec, Probe, SecurityContext, Service, ServicePort, ServiceSpec,
            VolumeMount, VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, OwnerReference},
        util::intstr::IntOrString,
    },
};
use kube::{api::ObjectMeta, Resource, ResourceExt};

use crate::api::v1alpha1::Cassandra;
use crate::util::errors::{Error, Result, StdError};

pub const CONTAINER_NAME: &str = "cassandra";
pub const CQL_PORT: i32 = 9042;
pub const INTRA_NODE_PORT: i32 = 7001;
pub const JMX_PORT: i32 = 7099;
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";
pub const TOLERATE_UNREADY_ANNOTATION: &str = "service.alpha.kubernetes.io/tolerate-unready-endpoints";

/// Labels selecting every resource that belongs to the named cluster.
pub fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "cassandra".to_string()),
        ("cassandra_cr".to_string(), name.to_string()),
    ])
}

/// Label selector string for list calls, e.g. `app=cassandra,cassandra_cr=example`.
pub fn selector(name: &str) -> String {
    labels(name)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Controller reference making the cluster the owner of what we create.
pub fn owner_reference(cassandra: &Cassandra) -> Result<OwnerReference> {
    cassandra.controller_owner_ref(&()).ok_or_else(|| {
        Error::StdError(StdError::MetadataMissing(format!(
            "uid of Cassandra '{}' is not set",
            cassandra.name_any()
        )))
    })
}

/// Headless service exposing the client port of every member, ready or not,
/// so that a fresh cluster can resolve its seed before it is ready.
pub fn headless_service(cassandra: &Cassandra, oref: &OwnerReference) -> Service {
    let labels = labels(&cassandra.name_any());

    Service {
        metadata: ObjectMeta {
            name: Some(cassandra.service_name()),
            namespace: cassandra.namespace(),
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([(
                TOLERATE_UNREADY_ANNOTATION.to_string(),
                "true".to_string(),
            )])),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            type_: Some("ClusterIP".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(labels),
            ports: Some(service_ports()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service_ports() -> Vec<ServicePort> {
    vec![ServicePort {
        name: Some("cql".to_string()),
        port: CQL_PORT,
        target_port: Some(IntOrString::Int(CQL_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]
}

pub fn statefulset(cassandra: &Cassandra, oref: &OwnerReference) -> StatefulSet {
    let name = cassandra.name_any();
    let labels = labels(&name);

    let mut env: Vec<EnvVar> = cassandra
        .spec
        .cassandra_env
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();
    env.push(EnvVar {
        name: "POD_IP".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "status.podIP".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cassandra.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(cassandra.service_name()),
            replicas: Some(cassandra.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            pod_management_policy: Some("OrderedReady".to_string()),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(cassandra.spec.partition),
                    ..Default::default()
                }),
            }),
            revision_history_limit: Some(10),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(cassandra.image()),
                        env: Some(env),
                        ports: Some(vec![
                            container_port("cql", CQL_PORT),
                            container_port("intra-node", INTRA_NODE_PORT),
                            container_port("jmx", JMX_PORT),
                        ]),
                        security_context: Some(SecurityContext {
                            capabilities: Some(Capabilities {
                                add: Some(vec!["IPC_LOCK".to_string()]),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        readiness_probe: Some(Probe {
                            exec: Some(ExecAction {
                                command: Some(vec![
                                    "/bin/bash".to_string(),
                                    "-c".to_string(),
                                    "/ready-probe.sh".to_string(),
                                ]),
                            }),
                            initial_delay_seconds: Some(15),
                            timeout_seconds: Some(5),
                            ..Default::default()
                        }),
                        lifecycle: Some(Lifecycle {
                            pre_stop: Some(LifecycleHandler {
                                exec: Some(ExecAction {
                                    command: Some(vec![
                                        "/bin/sh".to_string(),
                                        "-c".to_string(),
                                        "nodetool drain".to_string(),
                                    ]),
                                }),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "cassandra".to_string(),
                            mount_path: "/cassandra_data".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("cassandra".to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: cassandra
                        .spec
                        .storage_class_name
                        .clone()
                        .filter(|class| !class.is_empty()),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(DEFAULT_STORAGE_SIZE.to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..Default::default()
    }
}

/// Replica count, image and rollout partition of a workload set, the only fields we own.
pub fn replicas_of(statefulset: &StatefulSet) -> i32 {
    statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1)
}

pub fn image_of(statefulset: &StatefulSet) -> Option<String> {
    statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.iter().find(|c| c.name == CONTAINER_NAME))
        .and_then(|c| c.image.clone())
}

pub fn partition_of(statefulset: &StatefulSet) -> Option<i32> {
    statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.update_strategy.as_ref())
        .and_then(|strategy| strategy.rolling_update.as_ref())
        .and_then(|rolling| rolling.partition)
}

/// The tag part of an image reference, `repo:tag` -> `tag`.
pub fn version_of(image: &str) -> String {
    match image.rsplit_once(':') {
        Some((_, tag)) if !tag.contains('/') => tag.to_string(),
        _ => String::new(),
    }
}
