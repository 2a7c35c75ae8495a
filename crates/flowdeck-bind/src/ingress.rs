//! Intra-cluster ingress rules on the shared security group.
//!
//! `RolePorts` opens only the container ports of the bound task definition.
//! `AllPorts` opens the entire TCP range to every member of the security
//! group; it exists for deployments that rely on roles reaching each
//! other's ephemeral ports, and is logged every time it is applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use flowdeck_compose::TaskDefinition;

use crate::error::BindError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngressPolicy {
    #[default]
    RolePorts,
    AllPorts,
}

impl FromStr for IngressPolicy {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role-ports" => Ok(IngressPolicy::RolePorts),
            "all-ports" => Ok(IngressPolicy::AllPorts),
            other => Err(BindError::UnknownIngressPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for IngressPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressPolicy::RolePorts => f.write_str("role-ports"),
            IngressPolicy::AllPorts => f.write_str("all-ports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Security group allowed to connect.
    pub source_security_group: String,
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
}

impl IngressPolicy {
    /// Rules opening `definition` to members of `security_group`.
    pub fn rules_for(&self, definition: &TaskDefinition, security_group: &str) -> Vec<IngressRule> {
        let rule = |from_port, to_port| IngressRule {
            source_security_group: security_group.to_string(),
            protocol: "tcp".to_string(),
            from_port,
            to_port,
        };

        match self {
            IngressPolicy::RolePorts => definition
                .ports()
                .into_iter()
                .map(|port| rule(port, port))
                .collect(),
            IngressPolicy::AllPorts => {
                warn!(
                    family = %definition.family(),
                    security_group,
                    "opening all TCP ports to the shared security group"
                );
                vec![rule(0, u16::MAX)]
            }
        }
    }
}
