//! The synthesized deployment topology and its named outputs.

use serde::Serialize;

use flowdeck_bind::Service;
use flowdeck_compose::TaskDefinition;
use flowdeck_core::TrafficClass;

pub const ADMIN_PASSWORD_OUTPUT: &str = "AdminPassword";
pub const LOAD_BALANCER_DNS_OUTPUT: &str = "LoadBalancerDnsName";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputValue {
    Literal { value: String },
    /// Resolved by the platform once the resource exists.
    Attribute { resource: String, attribute: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentOutput {
    pub name: String,
    pub value: OutputValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Shared,
    Dedicated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    pub key: String,
    pub allocation: Allocation,
    pub traffic: TrafficClass,
    pub fingerprint: String,
    pub definition: TaskDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnDemandSummary {
    pub family: String,
    pub fingerprint: String,
    pub definition: TaskDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub deployment: String,
    pub cluster: String,
    pub units: Vec<UnitSummary>,
    pub services: Vec<Service>,
    pub on_demand: Vec<OnDemandSummary>,
    pub outputs: Vec<DeploymentOutput>,
}

impl Topology {
    pub fn unit(&self, key: &str) -> Option<&UnitSummary> {
        self.units.iter().find(|u| u.key == key)
    }

    pub fn service(&self, family: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.family() == family)
    }

    pub fn output(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.iter().find(|o| o.name == name).map(|o| &o.value)
    }

    pub fn load_balancer_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.load_balancer().is_some())
            .count()
    }

    pub fn autoscaling_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.autoscaling().is_some())
            .count()
    }

    /// Every task definition in the deployment, persistent first.
    pub fn task_definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.units
            .iter()
            .map(|u| &u.definition)
            .chain(self.on_demand.iter().map(|t| &t.definition))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
