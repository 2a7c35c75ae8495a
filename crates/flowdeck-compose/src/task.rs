//! Task definitions and the containers they own.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use flowdeck_core::{ImageRef, LogSink, ResourceShape, TrafficClass};

use crate::env::RuntimeEnvironment;
use crate::error::{ComposeError, ComposeResult};
use crate::policy::ExecutionIdentity;

/// Key of a deployment unit within a composition.
pub type UnitKey = String;

/// Key of the unit hosting every co-located role.
pub const PRIMARY_UNIT: &str = "primary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// Each task gets its own network interface; containers in the task
    /// share one network namespace.
    AwsVpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub filesystem_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub source_volume: String,
    pub container_path: String,
    pub read_only: bool,
}

/// One container inside a task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub role: String,
    pub traffic: TrafficClass,
    pub image: ImageRef,
    pub entry_point: Option<Vec<String>>,
    /// Snapshot of the shared runtime environment; empty for on-demand jobs.
    pub environment: RuntimeEnvironment,
    pub port_mappings: Vec<PortMapping>,
    pub resources: ResourceShape,
    pub log_sink: LogSink,
    pub mount_points: Vec<MountPoint>,
}

impl ContainerSpec {
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.port_mappings.iter().map(|p| p.container_port)
    }
}

/// Named unit of containers sharing a network namespace.
///
/// Mutated only while it is being built. Once wrapped in a `GrantedTask` or
/// an `OnDemandTask` it is read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    family: String,
    network_mode: NetworkMode,
    containers: Vec<ContainerSpec>,
    volumes: Vec<Volume>,
    execution_identity: ExecutionIdentity,
}

impl TaskDefinition {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            network_mode: NetworkMode::AwsVpc,
            containers: Vec::new(),
            volumes: Vec::new(),
            execution_identity: ExecutionIdentity::new(&format!("{family}-task-role")),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub fn containers(&self) -> &[ContainerSpec] {
        &self.containers
    }

    pub fn container(&self, role: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.role == role)
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn execution_identity(&self) -> &ExecutionIdentity {
        &self.execution_identity
    }

    pub(crate) fn execution_identity_mut(&mut self) -> &mut ExecutionIdentity {
        &mut self.execution_identity
    }

    /// Public if any container serves public traffic, otherwise
    /// internal-scaled if any container is persistent, otherwise on-demand.
    pub fn traffic(&self) -> TrafficClass {
        let classes = self.containers.iter().map(|c| c.traffic);
        if classes.clone().any(|c| c == TrafficClass::Public) {
            TrafficClass::Public
        } else if classes.clone().any(|c| c == TrafficClass::InternalScaled) {
            TrafficClass::InternalScaled
        } else {
            TrafficClass::OnDemand
        }
    }

    /// All container ports, ascending.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.containers.iter().flat_map(|c| c.ports()).collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    /// Port of the first public container, if any.
    pub fn public_port(&self) -> Option<u16> {
        self.containers
            .iter()
            .filter(|c| c.traffic == TrafficClass::Public)
            .find_map(|c| c.ports().next())
    }

    /// Add a container, keeping containers ordered by role name.
    ///
    /// Containers share one network namespace, so two containers cannot
    /// map the same port.
    pub fn add_container(&mut self, container: ContainerSpec) -> ComposeResult<()> {
        for port in container.ports() {
            if let Some(existing) = self.containers.iter().find(|c| c.ports().any(|p| p == port)) {
                return Err(ComposeError::PortConflict {
                    unit: self.family.clone(),
                    port,
                    first: existing.role.clone(),
                    second: container.role.clone(),
                });
            }
        }

        let idx = self
            .containers
            .partition_point(|c| c.role.as_str() < container.role.as_str());
        self.containers.insert(idx, container);
        Ok(())
    }

    pub fn add_volume(&mut self, volume: Volume) {
        if !self.volumes.iter().any(|v| v.name == volume.name) {
            self.volumes.push(volume);
        }
    }

    /// SHA-256 over the canonical JSON form of this definition.
    ///
    /// Stable across runs for the same inputs, so it can be compared between
    /// syntheses to spot drift. The admin secret is regenerated on every
    /// synthesis and is left out.
    pub fn fingerprint(&self) -> String {
        let mut canonical = self.clone();
        for container in &mut canonical.containers {
            container.environment = container.environment.redacted();
        }
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// A task definition together with how it was allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "allocation", content = "definition", rename_all = "snake_case")]
pub enum DeploymentUnit {
    /// Hosts the co-located roles, plus any isolated roles absorbed into it
    /// when the worker pool is disabled.
    Shared(TaskDefinition),
    /// Exclusively owned by one isolated role.
    Dedicated(TaskDefinition),
}

impl DeploymentUnit {
    pub fn definition(&self) -> &TaskDefinition {
        match self {
            DeploymentUnit::Shared(td) | DeploymentUnit::Dedicated(td) => td,
        }
    }

    pub fn into_definition(self) -> TaskDefinition {
        match self {
            DeploymentUnit::Shared(td) | DeploymentUnit::Dedicated(td) => td,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, DeploymentUnit::Shared(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(role: &str, port: u16, traffic: TrafficClass) -> ContainerSpec {
        ContainerSpec {
            role: role.to_string(),
            traffic,
            image: ImageRef("registry/airflow:1".to_string()),
            entry_point: None,
            environment: RuntimeEnvironment::empty(),
            port_mappings: vec![PortMapping {
                container_port: port,
                protocol: "tcp".to_string(),
            }],
            resources: ResourceShape { cpu_units: 256, memory_mib: 512 },
            log_sink: LogSink {
                stream_prefix: "flow".to_string(),
                retention_days: 30,
            },
            mount_points: Vec::new(),
        }
    }

    #[test]
    fn containers_stay_sorted_by_role() {
        let mut td = TaskDefinition::new("flow-primary");
        td.add_container(container("worker", 8082, TrafficClass::InternalScaled)).unwrap();
        td.add_container(container("scheduler", 8081, TrafficClass::InternalScaled)).unwrap();
        td.add_container(container("webserver", 8080, TrafficClass::Public)).unwrap();

        let roles: Vec<&str> = td.containers().iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["scheduler", "webserver", "worker"]);
        assert_eq!(td.ports(), vec![8080, 8081, 8082]);
        assert_eq!(td.public_port(), Some(8080));
        assert_eq!(td.traffic(), TrafficClass::Public);
    }

    #[test]
    fn port_conflict_is_rejected() {
        let mut td = TaskDefinition::new("flow-primary");
        td.add_container(container("webserver", 8080, TrafficClass::Public)).unwrap();
        let err = td
            .add_container(container("scheduler", 8080, TrafficClass::InternalScaled))
            .unwrap_err();
        assert!(matches!(err, ComposeError::PortConflict { port: 8080, .. }));
    }

    #[test]
    fn traffic_without_public_container() {
        let mut td = TaskDefinition::new("flow-worker");
        assert_eq!(td.traffic(), TrafficClass::OnDemand);
        td.add_container(container("worker", 8082, TrafficClass::InternalScaled)).unwrap();
        assert_eq!(td.traffic(), TrafficClass::InternalScaled);
        assert_eq!(td.public_port(), None);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let mut a = TaskDefinition::new("flow-worker");
        a.add_container(container("worker", 8082, TrafficClass::InternalScaled)).unwrap();
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let mut c = TaskDefinition::new("flow-worker");
        c.add_container(container("worker", 8083, TrafficClass::InternalScaled)).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_admin_secret() {
        let cluster = flowdeck_core::ClusterHandle {
            name: "flow-cluster".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_ids: vec!["subnet-a".to_string()],
            security_group_id: "sg-1".to_string(),
        };
        let with_secret = |secret: &str| {
            let env = RuntimeEnvironment::builder(&cluster, "postgresql://db/airflow")
                .admin_secret(secret)
                .build()
                .unwrap();
            let mut td = TaskDefinition::new("flow-worker");
            td.add_container(ContainerSpec {
                environment: env,
                ..container("worker", 8082, TrafficClass::InternalScaled)
            })
            .unwrap();
            td
        };

        let a = with_secret("first");
        let b = with_secret("second");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.containers()[0].environment.admin_secret(), Some("first"));

        let other_store = {
            let env = RuntimeEnvironment::builder(&cluster, "postgresql://other/airflow")
                .admin_secret("first")
                .build()
                .unwrap();
            let mut td = TaskDefinition::new("flow-worker");
            td.add_container(ContainerSpec {
                environment: env,
                ..container("worker", 8082, TrafficClass::InternalScaled)
            })
            .unwrap();
            td
        };
        assert_ne!(a.fingerprint(), other_store.fingerprint());
    }

    #[test]
    fn execution_identity_is_named_after_family() {
        let td = TaskDefinition::new("flow-primary");
        assert_eq!(td.execution_identity().name(), "flow-primary-task-role");
    }
}
