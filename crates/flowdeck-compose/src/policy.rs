//! Capability grants on task execution identities.
//!
//! Grants use set semantics: attaching a capability that is already held
//! changes nothing. A [`GrantedTask`] is only ever produced by
//! [`AccessPolicyAttacher::attach`], so holding one proves the grants were
//! applied before any service is built on top of it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::task::TaskDefinition;

/// Managed capability needed to mount a shared network filesystem.
pub const FILESYSTEM_READ_WRITE: &str = "AmazonElasticFileSystemClientReadWriteAccess";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// Fine-grained permission statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Principal a task's containers run as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    name: String,
    managed: BTreeSet<String>,
    statements: BTreeSet<PolicyStatement>,
}

impl ExecutionIdentity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            managed: BTreeSet::new(),
            statements: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grant a managed capability. Returns false if it was already held.
    pub fn grant_managed(&mut self, capability: &str) -> bool {
        self.managed.insert(capability.to_string())
    }

    /// Attach a permission statement. Returns false if it was already held.
    pub fn grant_statement(&mut self, statement: PolicyStatement) -> bool {
        self.statements.insert(statement)
    }

    pub fn has_managed(&self, capability: &str) -> bool {
        self.managed.contains(capability)
    }

    pub fn managed(&self) -> impl Iterator<Item = &str> {
        self.managed.iter().map(String::as_str)
    }

    pub fn statements(&self) -> impl Iterator<Item = &PolicyStatement> {
        self.statements.iter()
    }

    /// True when nothing beyond platform defaults has been granted.
    pub fn is_default(&self) -> bool {
        self.managed.is_empty() && self.statements.is_empty()
    }
}

/// Supplies the capabilities persistent tasks need.
///
/// The composer never enumerates platform permissions itself.
pub trait CapabilitySource {
    fn managed_capabilities(&self) -> Vec<String>;
    fn statements(&self) -> Vec<PolicyStatement>;
}

/// Capability source backed by a fixed list, typically from config.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    pub managed: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

impl CapabilitySource for StaticCapabilities {
    fn managed_capabilities(&self) -> Vec<String> {
        self.managed.clone()
    }

    fn statements(&self) -> Vec<PolicyStatement> {
        self.statements.clone()
    }
}

/// A task definition whose execution identity has received its grants.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedTask {
    definition: TaskDefinition,
}

impl GrantedTask {
    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn family(&self) -> &str {
        self.definition.family()
    }

    pub fn into_definition(self) -> TaskDefinition {
        self.definition
    }
}

/// Applies a capability source to task execution identities.
pub struct AccessPolicyAttacher<'a> {
    source: &'a dyn CapabilitySource,
}

impl<'a> AccessPolicyAttacher<'a> {
    pub fn new(source: &'a dyn CapabilitySource) -> Self {
        Self { source }
    }

    /// Grant every capability from the source to the task's identity.
    ///
    /// An empty source leaves the identity with platform defaults only.
    pub fn attach(&self, mut definition: TaskDefinition) -> GrantedTask {
        let managed = self.source.managed_capabilities();
        let statements = self.source.statements();

        if managed.is_empty() && statements.is_empty() {
            warn!(
                family = %definition.family(),
                "capability source is empty, identity keeps platform defaults"
            );
        }

        let identity = definition.execution_identity_mut();
        let mut added = 0usize;
        for capability in &managed {
            if identity.grant_managed(capability) {
                added += 1;
            } else {
                debug!(identity = %identity.name(), capability = %capability, "already granted");
            }
        }
        for statement in statements {
            if identity.grant_statement(statement) {
                added += 1;
            }
        }

        info!(
            family = %definition.family(),
            added,
            "capability grants attached"
        );
        GrantedTask { definition }
    }
}

/// Grant read-write filesystem access to a task's identity.
pub(crate) fn grant_filesystem_access(definition: &mut TaskDefinition) {
    definition
        .execution_identity_mut()
        .grant_managed(FILESYSTEM_READ_WRITE);
}
