//! Shared runtime environment injected into every persistent container.
//!
//! Independently scheduled roles coordinate through the backing store and
//! the broker named here, never by calling each other directly. The map is
//! built once and every container receives its own clone of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowdeck_core::ClusterHandle;

use crate::error::{ComposeError, ComposeResult};

pub const SQL_ALCHEMY_CONN: &str = "AIRFLOW__CORE__SQL_ALCHEMY_CONN";
pub const BROKER_URL: &str = "AIRFLOW__CELERY__BROKER_URL";
pub const RESULT_BACKEND: &str = "AIRFLOW__CELERY__RESULT_BACKEND";
pub const EXECUTOR: &str = "AIRFLOW__CORE__EXECUTOR";
pub const RBAC: &str = "AIRFLOW__WEBSERVER__RBAC";
pub const ADMIN_PASS: &str = "ADMIN_PASS";
pub const CLUSTER: &str = "CLUSTER";
pub const SECURITY_GROUP: &str = "SECURITY_GROUP";
pub const SUBNETS: &str = "SUBNETS";

const STANDARD_KEYS: &[&str] = &[
    SQL_ALCHEMY_CONN,
    BROKER_URL,
    RESULT_BACKEND,
    EXECUTOR,
    RBAC,
    ADMIN_PASS,
    CLUSTER,
    SECURITY_GROUP,
    SUBNETS,
];

const DEFAULT_BROKER_URL: &str = "sqs://";
const DEFAULT_EXECUTOR: &str = "CeleryExecutor";
const REDACTED_SECRET: &str = "<admin-secret>";

/// Immutable variable map shared verbatim by every persistent container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeEnvironment {
    vars: BTreeMap<String, String>,
}

impl RuntimeEnvironment {
    pub fn builder(cluster: &ClusterHandle, connection: &str) -> RuntimeEnvironmentBuilder {
        RuntimeEnvironmentBuilder {
            cluster: cluster.clone(),
            connection: connection.to_string(),
            broker_url: None,
            executor: None,
            admin_secret: None,
            extra: BTreeMap::new(),
        }
    }

    /// Environment with no variables, used by on-demand jobs.
    pub fn empty() -> Self {
        Self { vars: BTreeMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// The generated administrative secret.
    pub fn admin_secret(&self) -> Option<&str> {
        self.get(ADMIN_PASS)
    }

    /// Copy with the admin secret replaced by a fixed marker.
    pub(crate) fn redacted(&self) -> Self {
        let mut vars = self.vars.clone();
        if let Some(secret) = vars.get_mut(ADMIN_PASS) {
            *secret = REDACTED_SECRET.to_string();
        }
        Self { vars }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Collects the inputs of a [`RuntimeEnvironment`] before freezing it.
#[derive(Debug, Clone)]
pub struct RuntimeEnvironmentBuilder {
    cluster: ClusterHandle,
    connection: String,
    broker_url: Option<String>,
    executor: Option<String>,
    admin_secret: Option<String>,
    extra: BTreeMap<String, String>,
}

impl RuntimeEnvironmentBuilder {
    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.broker_url = Some(url.into());
        self
    }

    pub fn executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = Some(executor.into());
        self
    }

    /// Use a fixed secret instead of generating one.
    pub fn admin_secret(mut self, secret: impl Into<String>) -> Self {
        self.admin_secret = Some(secret.into());
        self
    }

    /// Operator-supplied variables merged alongside the standard keys.
    pub fn extra<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(self) -> ComposeResult<RuntimeEnvironment> {
        if let Some(key) = self.extra.keys().find(|k| STANDARD_KEYS.contains(&k.as_str())) {
            return Err(ComposeError::ReservedVariable(key.clone()));
        }

        let secret = self
            .admin_secret
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut vars = self.extra;
        vars.insert(SQL_ALCHEMY_CONN.to_string(), self.connection.clone());
        vars.insert(
            BROKER_URL.to_string(),
            self.broker_url.unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
        );
        vars.insert(RESULT_BACKEND.to_string(), format!("db+{}", self.connection));
        vars.insert(
            EXECUTOR.to_string(),
            self.executor.unwrap_or_else(|| DEFAULT_EXECUTOR.to_string()),
        );
        vars.insert(RBAC.to_string(), "True".to_string());
        vars.insert(ADMIN_PASS.to_string(), secret);
        vars.insert(CLUSTER.to_string(), self.cluster.name.clone());
        vars.insert(
            SECURITY_GROUP.to_string(),
            self.cluster.security_group_id.clone(),
        );
        vars.insert(SUBNETS.to_string(), self.cluster.subnet_ids.join(","));

        debug!(cluster = %self.cluster.name, vars = vars.len(), "runtime environment built");
        Ok(RuntimeEnvironment { vars })
    }
}
