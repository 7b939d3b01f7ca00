//! Helper methods only available for tests
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{Pod, Service},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{api::ObjectMeta, error::ErrorResponse, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};

use crate::api::v1alpha1::{Cassandra, CassandraSpec, EnvOverride};
use crate::controllers::resources::{self, labels};
use crate::controllers::store::{ObjectStore, Stores};
use crate::util::errors::{Error, Result};

/// A `Cassandra` in the default namespace with a uid, so owner references resolve.
pub fn test_cluster(name: &str, size: i32) -> Cassandra {
    Cassandra {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{name}-uid")),
            ..Default::default()
        },
        spec: CassandraSpec {
            size,
            repository: "repository".to_string(),
            version: "version".to_string(),
            partition: 1,
            storage_class_name: Some("standard".to_string()),
            cassandra_env: vec![
                EnvOverride {
                    name: "Env1".to_string(),
                    value: "value1".to_string(),
                },
                EnvOverride {
                    name: "Env2".to_string(),
                    value: "value2".to_string(),
                },
            ],
        },
        status: None,
    }
}

pub fn owner_reference(cassandra: &Cassandra) -> OwnerReference {
    resources::owner_reference(cassandra).unwrap()
}

/// A running member pod of the named cluster.
pub fn member_pod(cluster: &str, ordinal: i32) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{cluster}-{ordinal}")),
            namespace: Some("default".to_string()),
            labels: Some(labels(cluster)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

struct Inner<K> {
    objects: Vec<K>,
    calls: Vec<String>,
    writes: usize,
    failures: Vec<(String, u16, String)>,
}

/// In-memory object store recording every call.
pub struct FakeStore<K> {
    inner: Mutex<Inner<K>>,
}

impl<K> Default for FakeStore<K> {
    fn default() -> Self {
        FakeStore {
            inner: Mutex::new(Inner {
                objects: Vec::new(),
                calls: Vec::new(),
                writes: 0,
                failures: Vec::new(),
            }),
        }
    }
}

impl<K: ResourceExt + Clone> FakeStore<K> {
    pub fn with(objects: Vec<K>) -> Self {
        let store = FakeStore::default();
        store.inner.lock().unwrap().objects = objects;
        store
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .iter()
            .find(|o| is_named(*o, namespace, name))
            .cloned()
    }

    pub fn objects(&self) -> Vec<K> {
        self.inner.lock().unwrap().objects.clone()
    }

    /// Number of create, replace and status writes.
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// The next call of `op` fails with a server error.
    pub fn fail_next(&self, op: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push((op.to_string(), 500, "InternalError".to_string()));
    }

    pub fn fail_next_already_exists(&self, op: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push((op.to_string(), 409, "AlreadyExists".to_string()));
    }

    fn record(&self, call: String) -> Result<()> {
        let op = call.split(' ').next().unwrap_or_default().to_string();
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        match inner.failures.iter().position(|(o, _, _)| *o == op) {
            Some(i) => {
                let (_, code, reason) = inner.failures.remove(i);
                Err(api_error(code, &reason))
            }
            None => Ok(()),
        }
    }
}

fn is_named<K: ResourceExt>(object: &K, namespace: &str, name: &str) -> bool {
    object.namespace().as_deref() == Some(namespace) && object.name_any() == name
}

fn matches_selector<K: ResourceExt>(object: &K, selector: &str) -> bool {
    let labels: &BTreeMap<String, String> = object.labels();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl<K> ObjectStore<K> for FakeStore<K>
where
    K: ResourceExt + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.record(format!("get {namespace} {name}"))?;
        Ok(self.object(namespace, name))
    }

    async fn create(&self, object: &K) -> Result<K> {
        let ns = object.namespace().unwrap_or_default();
        self.record(format!("create {ns} {}", object.name_any()))?;
        let mut inner = self.inner.lock().unwrap();
        if inner.objects.iter().any(|o| is_named(o, &ns, &object.name_any())) {
            return Err(api_error(409, "AlreadyExists"));
        }
        inner.objects.push(object.clone());
        inner.writes += 1;
        Ok(object.clone())
    }

    async fn replace(&self, object: &K) -> Result<K> {
        let ns = object.namespace().unwrap_or_default();
        self.record(format!("replace {ns} {}", object.name_any()))?;
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .objects
            .iter_mut()
            .find(|o| is_named(&**o, &ns, &object.name_any()))
            .ok_or_else(|| api_error(404, "NotFound"))?;
        *slot = object.clone();
        inner.writes += 1;
        Ok(object.clone())
    }

    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>> {
        self.record(format!("list {namespace} {selector}"))?;
        Ok(self
            .objects()
            .into_iter()
            .filter(|o| o.namespace().as_deref() == Some(namespace) && matches_selector(o, selector))
            .collect())
    }

    async fn patch_status(&self, object: &K) -> Result<()> {
        let ns = object.namespace().unwrap_or_default();
        self.record(format!("patch_status {ns} {}", object.name_any()))?;
        let status = serde_json::to_value(object).unwrap()["status"].clone();
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .objects
            .iter_mut()
            .find(|o| is_named(&**o, &ns, &object.name_any()))
            .ok_or_else(|| api_error(404, "NotFound"))?;
        let mut stored = serde_json::to_value(&*slot).unwrap();
        stored["status"] = status;
        *slot = serde_json::from_value(stored).unwrap();
        inner.writes += 1;
        Ok(())
    }
}

/// Fake stores for every kind a reconcile pass touches.
#[derive(Default)]
pub struct FakeCluster {
    pub clusters: Arc<FakeStore<Cassandra>>,
    pub services: Arc<FakeStore<Service>>,
    pub statefulsets: Arc<FakeStore<StatefulSet>>,
    pub pods: Arc<FakeStore<Pod>>,
}

impl FakeCluster {
    pub fn stores(&self) -> Stores {
        Stores {
            clusters: self.clusters.clone(),
            services: self.services.clone(),
            statefulsets: self.statefulsets.clone(),
            pods: self.pods.clone(),
        }
    }

    /// Writes to the owned resources, status writes excluded.
    pub fn resource_writes(&self) -> usize {
        self.services.writes() + self.statefulsets.writes()
    }
}
