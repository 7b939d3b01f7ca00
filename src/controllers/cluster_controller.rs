use super::cluster::{reconcile_cluster, ClusterReconciler};
use super::exec::{CommandExecutor, PodExecutor};
use super::store::Stores;
use crate::api::v1alpha1::Cassandra;
use crate::util::config::Settings;
use crate::util::probe::Readiness;
use crate::util::{errors::Error, errors::Result, metrics};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::{apps::v1::StatefulSet, core::v1::Service};
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        watcher::Config,
    },
    Resource,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

const REQUEUE_AFTER: Duration = Duration::from_secs(5 * 60);

/// What happened to a watched cluster object.
#[derive(Clone, Debug)]
pub enum ClusterEvent {
    Apply(Arc<Cassandra>),
    Delete(Arc<Cassandra>),
}

impl ClusterEvent {
    pub fn from_object(cassandra: Arc<Cassandra>) -> Self {
        if cassandra.meta().deletion_timestamp.is_some() {
            ClusterEvent::Delete(cassandra)
        } else {
            ClusterEvent::Apply(cassandra)
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
    /// Set once the first event was handled
    readiness: Readiness,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            stores: Stores::kube(client.clone()),
            executor: Arc::new(PodExecutor::new(client.clone())),
            client,
            metrics: metrics::Metrics::default().register(&self.registry).unwrap(),
            diagnostics: self.diagnostics.clone(),
            readiness: self.readiness.clone(),
        })
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub stores: Stores,
    pub executor: Arc<dyn CommandExecutor>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
    pub readiness: Readiness,
}

#[instrument(skip_all, fields(cluster = %cassandra.name_any(), namespace = %cassandra.namespace().unwrap_or_default()))]
pub async fn reconcile(cassandra: Arc<Cassandra>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure("cassandra");
    ctx.diagnostics.write().await.last_event = Utc::now();

    let result = match ClusterEvent::from_object(cassandra) {
        ClusterEvent::Delete(cassandra) => {
            // owned objects go away through their owner references
            debug!("Cassandra '{}' is being deleted, nothing to do", cassandra.name_any());
            Ok(Action::await_change())
        }
        ClusterEvent::Apply(cassandra) => apply(&cassandra, &ctx).await,
    };

    ctx.readiness.set_ready();
    result
}

async fn apply(cassandra: &Cassandra, ctx: &Context) -> Result<Action> {
    info!(
        "Reconciling Cassandra \"{}\" in {}",
        cassandra.name_any(),
        cassandra.namespace().unwrap_or_default()
    );
    let mut reconciler = ClusterReconciler::new(
        cassandra,
        ctx.stores.clone(),
        ctx.executor.clone(),
        ctx.metrics.clone(),
    );

    match reconcile_cluster(Some(&mut reconciler)).await {
        Ok(()) => Ok(Action::requeue(REQUEUE_AFTER)),
        Err(e) => {
            let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());
            let event = Event {
                type_: EventType::Warning,
                reason: "ReconcileFailed".into(),
                note: Some(e.to_string()),
                action: "Reconciling".into(),
                secondary: None,
            };
            if let Err(publish_error) = recorder.publish(&event, &cassandra.object_ref(&())).await {
                warn!("failed to publish event: {}", publish_error);
            }
            Err(e)
        }
    }
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "cassandra-operator".into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

fn error_policy(cassandra: Arc<Cassandra>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {}", error);
    ctx.metrics.reconcile_failure(&cassandra, error);
    Action::requeue(error.requeue_after().unwrap_or(REQUEUE_AFTER))
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, settings: Settings) {
    let client = Client::try_default().await.expect("failed to create kube Client");

    let (clusters, statefulsets, services) = match settings.watch_namespace.as_deref() {
        Some(ns) => {
            info!("Watching namespace '{}'", ns);
            (
                Api::<Cassandra>::namespaced(client.clone(), ns),
                Api::<StatefulSet>::namespaced(client.clone(), ns),
                Api::<Service>::namespaced(client.clone(), ns),
            )
        }
        None => (
            Api::<Cassandra>::all(client.clone()),
            Api::<StatefulSet>::all(client.clone()),
            Api::<Service>::all(client.clone()),
        ),
    };

    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        std::process::exit(1);
    }

    Controller::new(clusters, Config::default().any_semantic())
        .owns(statefulsets, Config::default())
        .owns(services, Config::default())
        .run(reconcile, error_policy, state.to_context(client))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
