//! Task composer: maps persistent roles onto deployment units.
//!
//! Co-located roles share the `primary` unit. Each isolated role gets a
//! dedicated unit when the worker pool is enabled; otherwise it must be
//! absorbable and its container joins the primary unit instead. Every
//! container receives a clone of the same runtime environment.
//!
//! Roles are processed in name order, so the resulting topology does not
//! depend on the order of the input list.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use flowdeck_core::{ImageResolver, ImageSource, LogSink, Placement, RoleSpec};

use crate::env::RuntimeEnvironment;
use crate::error::{ComposeError, ComposeResult};
use crate::task::{ContainerSpec, DeploymentUnit, PRIMARY_UNIT, PortMapping, TaskDefinition, UnitKey};

/// Output of the composer: units keyed by unit key, plus which unit each
/// role's container landed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    units: BTreeMap<UnitKey, DeploymentUnit>,
    assignments: BTreeMap<String, UnitKey>,
}

impl Composition {
    pub fn units(&self) -> &BTreeMap<UnitKey, DeploymentUnit> {
        &self.units
    }

    pub fn unit(&self, key: &str) -> Option<&DeploymentUnit> {
        self.units.get(key)
    }

    /// The unit hosting the given role's container.
    pub fn unit_for_role(&self, role: &str) -> Option<&DeploymentUnit> {
        self.assignments.get(role).and_then(|key| self.units.get(key))
    }

    pub fn assignments(&self) -> &BTreeMap<String, UnitKey> {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_units(self) -> BTreeMap<UnitKey, DeploymentUnit> {
        self.units
    }
}

/// Builds task definitions for persistent roles.
pub struct TaskComposer<'a> {
    deployment: String,
    image: ImageSource,
    log_sink: LogSink,
    resolver: &'a dyn ImageResolver,
}

impl<'a> TaskComposer<'a> {
    pub fn new(
        deployment: &str,
        image: ImageSource,
        log_sink: LogSink,
        resolver: &'a dyn ImageResolver,
    ) -> Self {
        Self {
            deployment: deployment.to_string(),
            image,
            log_sink,
            resolver,
        }
    }

    pub fn compose(
        &self,
        roles: &[RoleSpec],
        create_worker_pool: bool,
        env: &RuntimeEnvironment,
    ) -> ComposeResult<Composition> {
        if roles.is_empty() {
            return Err(ComposeError::NoRoles);
        }

        let mut ordered: Vec<&RoleSpec> = roles.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        self.validate(&ordered, create_worker_pool)?;

        let mut definitions: BTreeMap<UnitKey, TaskDefinition> = BTreeMap::new();
        let mut dedicated: BTreeSet<UnitKey> = BTreeSet::new();
        let mut assignments = BTreeMap::new();

        for role in ordered {
            let key = match role.placement {
                Placement::CoLocated => PRIMARY_UNIT.to_string(),
                Placement::Isolated { .. } if create_worker_pool => {
                    dedicated.insert(role.name.clone());
                    role.name.clone()
                }
                Placement::Isolated { .. } => {
                    debug!(role = %role.name, "worker pool disabled, absorbing into primary unit");
                    PRIMARY_UNIT.to_string()
                }
            };

            let container = self.container_for(role, env)?;
            let family = format!("{}-{}", self.deployment, key);
            definitions
                .entry(key.clone())
                .or_insert_with(|| TaskDefinition::new(&family))
                .add_container(container)?;

            debug!(role = %role.name, unit = %key, "container placed");
            assignments.insert(role.name.clone(), key);
        }

        let units: BTreeMap<UnitKey, DeploymentUnit> = definitions
            .into_iter()
            .map(|(key, td)| {
                let unit = if dedicated.contains(&key) {
                    DeploymentUnit::Dedicated(td)
                } else {
                    DeploymentUnit::Shared(td)
                };
                (key, unit)
            })
            .collect();

        info!(
            deployment = %self.deployment,
            units = units.len(),
            roles = assignments.len(),
            create_worker_pool,
            "task definitions composed"
        );

        Ok(Composition { units, assignments })
    }

    fn validate(&self, roles: &[&RoleSpec], create_worker_pool: bool) -> ComposeResult<()> {
        let has_shared = roles.iter().any(|r| r.is_co_located());

        for role in roles {
            if !role.traffic.is_persistent() {
                return Err(ComposeError::NotPersistent { role: role.name.clone() });
            }
            if matches!(role.container_port, None | Some(0)) {
                return Err(ComposeError::MissingPort { role: role.name.clone() });
            }
            if let Placement::Isolated { absorbable } = role.placement {
                if create_worker_pool && role.name == PRIMARY_UNIT {
                    return Err(ComposeError::ReservedUnitName(role.name.clone()));
                }
                if !create_worker_pool && !absorbable {
                    return Err(ComposeError::NoAbsorptionTarget { role: role.name.clone() });
                }
                if !create_worker_pool && !has_shared {
                    return Err(ComposeError::NoSharedUnit { role: role.name.clone() });
                }
            }
        }
        Ok(())
    }

    fn container_for(&self, role: &RoleSpec, env: &RuntimeEnvironment) -> ComposeResult<ContainerSpec> {
        let source = role.image.as_ref().unwrap_or(&self.image);
        let image = self.resolver.resolve(&role.name, source)?;

        let port_mappings = role
            .container_port
            .map(|port| PortMapping {
                container_port: port,
                protocol: "tcp".to_string(),
            })
            .into_iter()
            .collect();

        Ok(ContainerSpec {
            role: role.name.clone(),
            traffic: role.traffic,
            image,
            entry_point: role.entry_point.as_ref().map(|e| vec![e.clone()]),
            environment: env.clone(),
            port_mappings,
            resources: role.resources,
            log_sink: self.log_sink.clone(),
            mount_points: Vec::new(),
        })
    }
}
