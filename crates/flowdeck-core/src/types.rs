//! Shared types used across flowdeck crates.

use serde::{Deserialize, Serialize};

use crate::image::ImageSource;

/// How a role receives traffic once deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficClass {
    /// Load-balanced public entry point.
    Public,
    /// Autoscaled pool with no public endpoint.
    InternalScaled,
    /// Registered task definition with no running service.
    OnDemand,
}

impl TrafficClass {
    /// Whether roles of this class run as a long-lived service.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, TrafficClass::OnDemand)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrafficClass::Public => "public",
            TrafficClass::InternalScaled => "internal-scaled",
            TrafficClass::OnDemand => "on-demand",
        }
    }
}

/// Which deployment unit a persistent role's container is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Placement {
    /// Shares the primary unit with every other co-located role.
    CoLocated,
    /// Gets a dedicated unit when the worker pool is enabled.
    ///
    /// `absorbable` roles fall back onto the primary unit when the pool is
    /// disabled; non-absorbable ones make that configuration invalid.
    Isolated { absorbable: bool },
}

/// CPU and memory reserved for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    /// CPU units (1024 = one vCPU).
    pub cpu_units: u32,
    /// Hard memory limit in MiB.
    pub memory_mib: u32,
}

/// Static description of a logical role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    /// Port the container listens on. Required for persistent roles.
    pub container_port: Option<u16>,
    pub resources: ResourceShape,
    /// Entrypoint override; `None` keeps the image default.
    pub entry_point: Option<String>,
    pub traffic: TrafficClass,
    pub placement: Placement,
    /// Per-role image; `None` uses the deployment's shared image.
    pub image: Option<ImageSource>,
}

impl RoleSpec {
    /// Build a persistent role with the deployment's shared image.
    pub fn persistent(
        name: &str,
        port: u16,
        resources: ResourceShape,
        entry_point: &str,
        traffic: TrafficClass,
        placement: Placement,
    ) -> Self {
        RoleSpec {
            name: name.to_string(),
            container_port: Some(port),
            resources,
            entry_point: Some(entry_point.to_string()),
            traffic,
            placement,
            image: None,
        }
    }

    /// Build an on-demand job role.
    pub fn on_demand(name: &str, resources: ResourceShape, image: Option<ImageSource>) -> Self {
        RoleSpec {
            name: name.to_string(),
            container_port: None,
            resources,
            entry_point: None,
            traffic: TrafficClass::OnDemand,
            placement: Placement::Isolated { absorbable: false },
            image,
        }
    }

    pub fn is_co_located(&self) -> bool {
        matches!(self.placement, Placement::CoLocated)
    }
}

/// Opaque cluster identity and network context, supplied fully formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHandle {
    pub name: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    /// Shared security boundary every service joins.
    pub security_group_id: String,
}

/// Opaque log destination attached to every container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSink {
    pub stream_prefix: String,
    pub retention_days: u32,
}

/// External network filesystem mounted into an on-demand task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemDescriptor {
    pub volume_name: String,
    pub filesystem_id: String,
    pub container_path: String,
}
