//! flowdeck.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::catalog::RoleCatalog;
use crate::image::ImageSource;
use crate::types::{
    ClusterHandle, FilesystemDescriptor, LogSink, Placement, ResourceShape, RoleSpec,
    TrafficClass,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub deployment: DeploymentConfig,
    pub cluster: ClusterHandle,
    pub backing_store: BackingStoreConfig,
    pub logging: Option<LogSink>,
    /// Absent means the standard webserver / scheduler / worker table.
    pub roles: Option<Vec<RoleConfig>>,
    pub autoscaling: Option<AutoscalingConfig>,
    pub load_balancer: Option<LoadBalancerConfig>,
    pub capabilities: Option<CapabilitiesConfig>,
    #[serde(default)]
    pub on_demand: Vec<OnDemandConfig>,
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    /// Shared image for persistent roles (oci:// or asset://).
    pub image: String,
    #[serde(default = "default_true")]
    pub create_worker_pool: bool,
    /// "role-ports" (default) or "all-ports".
    pub ingress: Option<String>,
    pub broker_url: Option<String>,
    pub executor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackingStoreConfig {
    /// Passed into the runtime environment verbatim.
    pub connection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub container_port: Option<u16>,
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub entry_point: Option<String>,
    pub traffic: TrafficClass,
    /// "co-located" (default) or "isolated".
    pub placement: Option<String>,
    pub absorbable: Option<bool>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    pub min_count: u32,
    pub max_count: u32,
    pub cpu_target_percent: Option<u32>,
    pub memory_target_percent: Option<u32>,
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub listener_port: Option<u16>,
    pub health_path: Option<String>,
    pub deregistration_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub managed: Vec<String>,
    #[serde(default)]
    pub statements: Vec<StatementConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementConfig {
    /// "allow" (default) or "deny".
    pub effect: Option<String>,
    pub actions: Vec<String>,
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnDemandConfig {
    pub name: String,
    /// Task family; defaults to `<deployment>-<name>`.
    pub family: Option<String>,
    /// Image for the job; defaults to the deployment image.
    pub image: Option<String>,
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub filesystem: Option<FilesystemDescriptor>,
}

fn default_true() -> bool {
    true
}

fn default_resources() -> Vec<String> {
    vec!["*".to_string()]
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DeployConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Log sink for every container, with a 30 day default retention.
    pub fn log_sink(&self) -> LogSink {
        self.logging.clone().unwrap_or_else(|| LogSink {
            stream_prefix: self.deployment.name.clone(),
            retention_days: 30,
        })
    }

    pub fn image_source(&self) -> anyhow::Result<ImageSource> {
        Ok(ImageSource::parse(&self.deployment.image)?)
    }

    /// Build the role catalog: configured (or standard) persistent roles
    /// plus one on-demand role per `[[on_demand]]` entry.
    pub fn catalog(&self) -> anyhow::Result<RoleCatalog> {
        let mut roles = match &self.roles {
            Some(configured) => configured
                .iter()
                .map(RoleConfig::to_spec)
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => {
                debug!(deployment = %self.deployment.name, "no roles configured, using standard catalog");
                RoleCatalog::standard().roles().to_vec()
            }
        };

        for job in &self.on_demand {
            let image = job.image.as_deref().map(ImageSource::parse).transpose()?;
            roles.push(RoleSpec::on_demand(
                &job.name,
                ResourceShape { cpu_units: job.cpu_units, memory_mib: job.memory_mib },
                image,
            ));
        }

        Ok(RoleCatalog::new(roles)?)
    }

    /// Scaffold a starter flowdeck.toml.
    pub fn scaffold(name: &str) -> Self {
        DeployConfig {
            deployment: DeploymentConfig {
                name: name.to_string(),
                image: "asset://./airflow".to_string(),
                create_worker_pool: true,
                ingress: Some("role-ports".to_string()),
                broker_url: None,
                executor: None,
            },
            cluster: ClusterHandle {
                name: format!("{name}-cluster"),
                vpc_id: "vpc-00000000".to_string(),
                subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
                security_group_id: "sg-00000000".to_string(),
            },
            backing_store: BackingStoreConfig {
                connection: "postgresql+psycopg2://airflow:airflow@db:5432/airflow".to_string(),
            },
            logging: Some(LogSink {
                stream_prefix: name.to_string(),
                retention_days: 30,
            }),
            roles: None,
            autoscaling: Some(AutoscalingConfig {
                min_count: 1,
                max_count: 5,
                cpu_target_percent: Some(70),
                memory_target_percent: Some(70),
                cooldown_secs: None,
            }),
            load_balancer: None,
            capabilities: Some(CapabilitiesConfig {
                managed: vec![
                    "AmazonSQSFullAccess".to_string(),
                    "AmazonECS_FullAccess".to_string(),
                ],
                statements: vec![StatementConfig {
                    effect: None,
                    actions: vec!["iam:PassRole".to_string()],
                    resources: default_resources(),
                }],
            }),
            on_demand: Vec::new(),
            env: None,
        }
    }
}

impl RoleConfig {
    pub fn to_spec(&self) -> anyhow::Result<RoleSpec> {
        let placement = match self.placement.as_deref().unwrap_or("co-located") {
            "co-located" => Placement::CoLocated,
            "isolated" => Placement::Isolated {
                absorbable: self.absorbable.unwrap_or(false),
            },
            other => anyhow::bail!("role {}: unknown placement '{other}'", self.name),
        };
        let image = self.image.as_deref().map(ImageSource::parse).transpose()?;

        Ok(RoleSpec {
            name: self.name.clone(),
            container_port: self.container_port,
            resources: ResourceShape {
                cpu_units: self.cpu_units,
                memory_mib: self.memory_mib,
            },
            entry_point: self.entry_point.clone(),
            traffic: self.traffic,
            placement,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[deployment]
name = "flow"
image = "oci://registry.example.com/airflow:2.1.0"

[cluster]
name = "flow-cluster"
vpc_id = "vpc-1"
subnet_ids = ["subnet-1", "subnet-2"]
security_group_id = "sg-1"

[backing_store]
connection = "postgresql://db/airflow"
"#;

    #[test]
    fn test_scaffold() {
        let config = DeployConfig::scaffold("my-flow");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("my-flow"));
        assert!(toml_str.contains("asset://./airflow"));
        let parsed: DeployConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.deployment.name, "my-flow");
    }

    #[test]
    fn test_parse_minimal() {
        let config: DeployConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.deployment.name, "flow");
        assert!(config.deployment.create_worker_pool);
        assert_eq!(config.cluster.subnet_ids.len(), 2);
        assert_eq!(config.log_sink().stream_prefix, "flow");
        assert_eq!(config.catalog().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_roles_and_on_demand() {
        let toml_str = format!(
            r#"{MINIMAL}
[[roles]]
name = "web"
container_port = 8080
cpu_units = 256
memory_mib = 512
traffic = "public"

[[roles]]
name = "pool"
container_port = 8793
cpu_units = 512
memory_mib = 1024
traffic = "internal-scaled"
placement = "isolated"
absorbable = true

[[on_demand]]
name = "odd-numbers"
image = "asset://./tasks/odd_numbers"
cpu_units = 256
memory_mib = 512

[on_demand.filesystem]
volume_name = "shared"
filesystem_id = "fs-1234"
container_path = "/mnt/shared"
"#
        );
        let config: DeployConfig = toml::from_str(&toml_str).unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.get("pool").unwrap().placement,
            Placement::Isolated { absorbable: true }
        );
        assert_eq!(catalog.on_demand().len(), 1);
        assert!(config.on_demand[0].filesystem.is_some());
    }

    #[test]
    fn test_unknown_placement_is_rejected() {
        let toml_str = format!(
            r#"{MINIMAL}
[[roles]]
name = "web"
container_port = 8080
cpu_units = 256
memory_mib = 512
traffic = "public"
placement = "sideways"
"#
        );
        let config: DeployConfig = toml::from_str(&toml_str).unwrap();
        let err = config.catalog().unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowdeck.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = DeployConfig::from_file(&path).unwrap();
        assert_eq!(config.backing_store.connection, "postgresql://db/airflow");
        assert!(DeployConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
