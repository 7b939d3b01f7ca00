use chrono::{DateTime, Utc};
use core::fmt;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::util::errors::StdError;

pub const DEFAULT_REPOSITORY: &str = "gcr.io/google-samples/cassandra";
pub const DEFAULT_VERSION: &str = "v13";

/// Generate the Kubernetes wrapper struct `Cassandra` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen.rs)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "Cassandra",
    group = "database.camilocot",
    version = "v1alpha1",
    namespaced
)]
#[kube(status = "CassandraStatus", shortname = "cassandra")]
#[serde(rename_all = "camelCase")]
pub struct CassandraSpec {
    /// Expected number of cassandra members.
    #[schemars(range(min = 0))]
    pub size: i32,
    /// Image repository hosting the cassandra images.
    #[serde(default)]
    pub repository: String,
    /// Image tag to run.
    #[serde(default)]
    pub version: String,
    /// Pods with an ordinal below the partition keep the previous version during a rollout.
    #[serde(default)]
    pub partition: i32,
    pub storage_class_name: Option<String>,
    /// Extra environment for the cassandra container, names are unique.
    #[serde(default)]
    pub cassandra_env: Vec<EnvOverride>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct EnvOverride {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ClusterPhase {
    Creating,
    Running,
    Failed,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    Available,
    Scaling,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One typed condition of the cluster, at most one entry exists per type.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub last_update_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// The status object of `Cassandra`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraStatus {
    pub phase: Option<ClusterPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    #[schemars(schema_with = "super::conditions_schema")]
    pub conditions: Vec<ClusterCondition>,
    #[serde(default)]
    pub size: i32,
    /// Pod names of the members, in listing order.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub current_version: String,
    /// Empty unless the cluster is moving to another version.
    #[serde(default)]
    pub target_version: String,
}

impl Cassandra {
    /// Rejects specs the API server would have refused had the schema been enforced.
    pub fn validate(&self) -> Result<(), StdError> {
        if self.spec.size < 0 {
            return Err(StdError::InvalidSpec(format!(
                "size must not be negative, got {}",
                self.spec.size
            )));
        }
        Ok(())
    }

    /// Fills unset image fields and the required environment.
    ///
    /// Environment entries are only added when no entry with the same name
    /// exists, so user overrides win and repeated calls change nothing.
    /// Returns whether the image fields were changed.
    pub fn set_defaults(&mut self) -> bool {
        let mut changed = false;

        if self.spec.repository.is_empty() {
            self.spec.repository = DEFAULT_REPOSITORY.to_string();
            changed = true;
        }
        if self.spec.version.is_empty() {
            self.spec.version = DEFAULT_VERSION.to_string();
            changed = true;
        }

        let seeds = self.seed_address();
        self.add_env("CASSANDRA_SEEDS", &seeds);
        self.add_env("MAX_HEAP_SIZE", "512M");
        self.add_env("HEAP_NEWSIZE", "100M");

        changed
    }

    fn add_env(&mut self, name: &str, value: &str) {
        if self.spec.cassandra_env.iter().any(|e| e.name == name) {
            return;
        }
        self.spec.cassandra_env.push(EnvOverride {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// DNS name of the first member behind the headless service.
    pub fn seed_address(&self) -> String {
        let name = self.name_any();
        format!(
            "{name}-0.{}.{}.svc.cluster.local",
            self.service_name(),
            self.namespace().unwrap_or_else(|| "default".to_string())
        )
    }

    pub fn service_name(&self) -> String {
        format!("{}-unready", self.name_any())
    }

    pub fn image(&self) -> String {
        format!("{}:{}", self.spec.repository, self.spec.version)
    }

    /// Name of the member pod at the given ordinal.
    pub fn member_name(&self, ordinal: i32) -> String {
        format!("{}-{}", self.name_any(), ordinal)
    }
}
