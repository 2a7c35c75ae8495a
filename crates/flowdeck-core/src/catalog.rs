//! Role catalog: the static table of roles a deployment is built from.

use std::collections::HashSet;

use thiserror::Error;

use crate::types::{Placement, ResourceShape, RoleSpec, TrafficClass};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate role name: {0}")]
    DuplicateRole(String),

    #[error("role {role}: {reason}")]
    InvalidRole { role: String, reason: String },

    #[error("catalog has no roles")]
    Empty,
}

/// Validated, immutable set of role specs. Identity is the role name.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCatalog {
    roles: Vec<RoleSpec>,
}

impl RoleCatalog {
    pub fn new(roles: Vec<RoleSpec>) -> Result<Self, CatalogError> {
        if roles.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for role in &roles {
            if !seen.insert(role.name.as_str()) {
                return Err(CatalogError::DuplicateRole(role.name.clone()));
            }
            validate_role(role)?;
        }

        Ok(Self { roles })
    }

    /// The built-in webserver / scheduler / worker table.
    pub fn standard() -> Self {
        Self {
            roles: vec![
                RoleSpec::persistent(
                    "webserver",
                    8080,
                    ResourceShape { cpu_units: 512, memory_mib: 1024 },
                    "/webserver_entry.sh",
                    TrafficClass::Public,
                    Placement::CoLocated,
                ),
                RoleSpec::persistent(
                    "scheduler",
                    8081,
                    ResourceShape { cpu_units: 512, memory_mib: 1024 },
                    "/scheduler_entry.sh",
                    TrafficClass::InternalScaled,
                    Placement::CoLocated,
                ),
                RoleSpec::persistent(
                    "worker",
                    8082,
                    ResourceShape { cpu_units: 1024, memory_mib: 2048 },
                    "/worker_entry.sh",
                    TrafficClass::InternalScaled,
                    Placement::Isolated { absorbable: true },
                ),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    /// Roles that run as long-lived services.
    pub fn persistent(&self) -> Vec<RoleSpec> {
        self.roles
            .iter()
            .filter(|r| r.traffic.is_persistent())
            .cloned()
            .collect()
    }

    /// Roles registered as on-demand task definitions only.
    pub fn on_demand(&self) -> Vec<RoleSpec> {
        self.roles
            .iter()
            .filter(|r| !r.traffic.is_persistent())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

fn validate_role(role: &RoleSpec) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidRole {
        role: role.name.clone(),
        reason: reason.to_string(),
    };

    if role.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if role.resources.cpu_units == 0 {
        return Err(invalid("cpu_units must be greater than zero"));
    }
    if role.resources.memory_mib == 0 {
        return Err(invalid("memory_mib must be greater than zero"));
    }
    if role.traffic.is_persistent() && matches!(role.container_port, None | Some(0)) {
        return Err(invalid("persistent roles need a non-zero container_port"));
    }
    Ok(())
}
