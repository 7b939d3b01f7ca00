use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{Pod, Service},
};
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    core::NamespaceResourceScope,
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::api::v1alpha1::Cassandra;
use crate::util::errors::{Error, Result, StdError};

pub const FIELD_MANAGER: &str = "cassandra-operator";

/// Namespaced object access used by the reconcile steps.
///
/// Every call is a round trip to the API server in production, tests swap in an
/// in-memory store.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    /// Returns `None` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create(&self, object: &K) -> Result<K>;

    async fn replace(&self, object: &K) -> Result<K>;

    /// Lists objects matching a `k=v,k=v` label selector.
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>>;

    /// Writes only the status subresource of the object.
    async fn patch_status(&self, object: &K) -> Result<()>;
}

pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        KubeStore {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: Resource>(object: &K) -> Result<String> {
    object
        .namespace()
        .ok_or_else(|| Error::StdError(StdError::MetadataMissing("namespace".to_string())))
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, object: &K) -> Result<K> {
        let ns = namespace_of(object)?;
        Ok(self.api(&ns).create(&PostParams::default(), object).await?)
    }

    async fn replace(&self, object: &K) -> Result<K> {
        let ns = namespace_of(object)?;
        Ok(self
            .api(&ns)
            .replace(&object.name_any(), &PostParams::default(), object)
            .await?)
    }

    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>> {
        let params = ListParams::default().labels(selector);
        Ok(self.api(namespace).list(&params).await?.items)
    }

    async fn patch_status(&self, object: &K) -> Result<()> {
        let ns = namespace_of(object)?;
        let value = serde_json::to_value(object)
            .map_err(|e| Error::StdError(StdError::JsonSerializationError(e)))?;
        let patch = json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": value.get("status").cloned().unwrap_or_default(),
        });
        self.api(&ns)
            .patch_status(
                &object.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&patch),
            )
            .await?;
        Ok(())
    }
}

/// The stores a reconcile pass reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub clusters: Arc<dyn ObjectStore<Cassandra>>,
    pub services: Arc<dyn ObjectStore<Service>>,
    pub statefulsets: Arc<dyn ObjectStore<StatefulSet>>,
    pub pods: Arc<dyn ObjectStore<Pod>>,
}

impl Stores {
    pub fn kube(client: Client) -> Self {
        Stores {
            clusters: Arc::new(KubeStore::<Cassandra>::new(client.clone())),
            services: Arc::new(KubeStore::<Service>::new(client.clone())),
            statefulsets: Arc::new(KubeStore::<StatefulSet>::new(client.clone())),
            pods: Arc::new(KubeStore::<Pod>::new(client)),
        }
    }
}
