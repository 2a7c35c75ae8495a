//! Staged synthesis pipeline.
//!
//! Each unit moves through `pending → granted → bound`. The stages can be
//! driven one at a time (useful for inspecting intermediate state) or all
//! at once with [`Synthesizer::synthesize`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use flowdeck_bind::{BindError, Service, ServiceBinder};
use flowdeck_compose::{
    AccessPolicyAttacher, CapabilitySource, ComposeError, DeploymentUnit, GrantedTask,
    OnDemandRegistry,
    OnDemandSpec, OnDemandTask, TaskComposer, UnitKey,
};
use flowdeck_core::{ImageResolver, PassthroughResolver};

use crate::error::{SynthError, SynthResult};
use crate::inputs::DeploymentInputs;
use crate::topology::{
    ADMIN_PASSWORD_OUTPUT, Allocation, DeploymentOutput, LOAD_BALANCER_DNS_OUTPUT,
    OnDemandSummary, OutputValue, Topology, UnitSummary,
};

pub struct Synthesizer {
    inputs: DeploymentInputs,
    resolver: Box<dyn ImageResolver>,
    capabilities: Box<dyn CapabilitySource>,
    binder: ServiceBinder,
    composed: bool,
    /// Composed units awaiting their capability grants.
    pending: BTreeMap<UnitKey, DeploymentUnit>,
    granted: BTreeMap<UnitKey, (GrantedTask, Allocation)>,
    bound: BTreeMap<UnitKey, (Service, Allocation)>,
    on_demand: Option<Vec<OnDemandTask>>,
}

impl Synthesizer {
    pub fn new(inputs: DeploymentInputs) -> Self {
        let binder = ServiceBinder::new(inputs.cluster.clone())
            .with_load_balancer(inputs.load_balancer.clone())
            .with_autoscaling(inputs.autoscaling.clone())
            .with_ingress(inputs.ingress);
        let capabilities = Box::new(inputs.capabilities.clone());

        Self {
            inputs,
            resolver: Box::new(PassthroughResolver),
            capabilities,
            binder,
            composed: false,
            pending: BTreeMap::new(),
            granted: BTreeMap::new(),
            bound: BTreeMap::new(),
            on_demand: None,
        }
    }

    /// Use a packaging collaborator instead of passing sources through.
    pub fn with_resolver(mut self, resolver: Box<dyn ImageResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_capability_source(mut self, source: Box<dyn CapabilitySource>) -> Self {
        self.capabilities = source;
        self
    }

    /// Compose task definitions for every persistent role. Returns the
    /// unit keys in order.
    pub fn compose(&mut self) -> SynthResult<Vec<UnitKey>> {
        if self.composed {
            return Err(SynthError::StageRepeated("compose"));
        }

        let composer = TaskComposer::new(
            &self.inputs.name,
            self.inputs.image.clone(),
            self.inputs.log_sink.clone(),
            self.resolver.as_ref(),
        );
        let composition = composer.compose(
            &self.inputs.catalog.persistent(),
            self.inputs.create_worker_pool,
            &self.inputs.environment,
        )?;

        self.composed = true;
        self.pending = composition.into_units();
        Ok(self.pending.keys().cloned().collect())
    }

    /// Attach capability grants to a composed unit. Granting an already
    /// granted unit is a no-op.
    pub fn grant(&mut self, unit: &str) -> SynthResult<()> {
        if self.granted.contains_key(unit) || self.bound.contains_key(unit) {
            debug!(unit, "grants already attached");
            return Ok(());
        }

        let deployment_unit = self
            .pending
            .remove(unit)
            .ok_or_else(|| SynthError::UnknownUnit(unit.to_string()))?;
        let allocation = if deployment_unit.is_shared() {
            Allocation::Shared
        } else {
            Allocation::Dedicated
        };

        let attacher = AccessPolicyAttacher::new(self.capabilities.as_ref());
        let task = attacher.attach(deployment_unit.into_definition());
        self.granted.insert(unit.to_string(), (task, allocation));
        Ok(())
    }

    /// Create the service for a granted unit.
    pub fn bind(&mut self, unit: &str) -> SynthResult<&Service> {
        if self.pending.contains_key(unit) {
            return Err(SynthError::OrderingViolation { unit: unit.to_string() });
        }
        if let Some((service, _)) = self.bound.get(unit) {
            return Err(BindError::AlreadyBound {
                family: service.family().to_string(),
                kind: service.attachment.kind(),
            }
            .into());
        }

        let (task, allocation) = self
            .granted
            .remove(unit)
            .ok_or_else(|| SynthError::UnknownUnit(unit.to_string()))?;
        let class = task.definition().traffic();
        let service = self.binder.bind(task, class)?;

        let (service, _) = self
            .bound
            .entry(unit.to_string())
            .or_insert((service, allocation));
        Ok(&*service)
    }

    /// Register a task definition for every on-demand role. Runs after
    /// `compose()` so families can be checked against persistent units.
    pub fn register_on_demand(&mut self) -> SynthResult<usize> {
        if !self.composed {
            return Err(SynthError::StageSkipped("compose"));
        }
        if self.on_demand.is_some() {
            return Err(SynthError::StageRepeated("register_on_demand"));
        }

        let roles = self.inputs.catalog.on_demand();
        if let Some(unknown) = self
            .inputs
            .on_demand
            .keys()
            .find(|name| !roles.iter().any(|r| &r.name == *name))
        {
            return Err(SynthError::Config(format!(
                "on-demand settings given for '{unknown}', which is not an on-demand role"
            )));
        }

        let persistent = self.persistent_families();
        let mut registry = OnDemandRegistry::new(self.resolver.as_ref());
        for role in &roles {
            let job = self.inputs.on_demand.get(&role.name).cloned().unwrap_or_default();
            let family = job
                .family
                .unwrap_or_else(|| format!("{}-{}", self.inputs.name, role.name));
            if persistent.contains(family.as_str()) {
                return Err(ComposeError::DuplicateTask(family).into());
            }
            registry.register(OnDemandSpec {
                family,
                container_name: role.name.clone(),
                image: role.image.clone().unwrap_or_else(|| self.inputs.image.clone()),
                resources: role.resources,
                log_sink: self.inputs.log_sink.clone(),
                filesystem: job.filesystem,
            })?;
        }

        let tasks = registry.into_tasks();
        let count = tasks.len();
        self.on_demand = Some(tasks);
        Ok(count)
    }

    fn persistent_families(&self) -> BTreeSet<&str> {
        self.pending
            .values()
            .map(|unit| unit.definition().family())
            .chain(self.granted.values().map(|(task, _)| task.family()))
            .chain(self.bound.values().map(|(service, _)| service.family()))
            .collect()
    }

    /// Check the finished state and assemble the topology.
    pub fn finish(mut self) -> SynthResult<Topology> {
        if !self.composed {
            return Err(SynthError::StageSkipped("compose"));
        }
        if let Some(unit) = self.pending.keys().chain(self.granted.keys()).next() {
            return Err(SynthError::Unbound(unit.clone()));
        }
        if self.on_demand.is_none() {
            self.register_on_demand()?;
        }

        for (service, _) in self.bound.values() {
            for container in service.definition().containers() {
                if container.environment != self.inputs.environment {
                    return Err(SynthError::Config(format!(
                        "{}/{} received a partial runtime environment",
                        service.family(),
                        container.role
                    )));
                }
            }
        }

        let on_demand = self.on_demand.take().unwrap_or_default();
        for task in &on_demand {
            task.validate()?;
        }

        let mut outputs = Vec::new();
        if let Some(secret) = self.inputs.environment.admin_secret() {
            outputs.push(DeploymentOutput {
                name: ADMIN_PASSWORD_OUTPUT.to_string(),
                value: OutputValue::Literal { value: secret.to_string() },
            });
        }
        if let Some(lb) = self.bound.values().find_map(|(s, _)| s.load_balancer()) {
            let (resource, attribute) = lb.dns_name_attribute();
            outputs.push(DeploymentOutput {
                name: LOAD_BALANCER_DNS_OUTPUT.to_string(),
                value: OutputValue::Attribute {
                    resource: resource.to_string(),
                    attribute: attribute.to_string(),
                },
            });
        }

        let mut units = Vec::with_capacity(self.bound.len());
        let mut services = Vec::with_capacity(self.bound.len());
        for (key, (service, allocation)) in self.bound {
            units.push(UnitSummary {
                key,
                allocation,
                traffic: service.traffic,
                fingerprint: service.definition().fingerprint(),
                definition: service.definition().clone(),
            });
            services.push(service);
        }

        let on_demand: Vec<OnDemandSummary> = on_demand
            .into_iter()
            .map(|task| OnDemandSummary {
                family: task.family().to_string(),
                fingerprint: task.definition().fingerprint(),
                definition: task.definition().clone(),
            })
            .collect();

        info!(
            deployment = %self.inputs.name,
            units = units.len(),
            services = services.len(),
            on_demand = on_demand.len(),
            "topology synthesized"
        );

        Ok(Topology {
            deployment: self.inputs.name,
            cluster: self.inputs.cluster.name,
            units,
            services,
            on_demand,
            outputs,
        })
    }

    /// Run every stage in order.
    pub fn synthesize(mut self) -> SynthResult<Topology> {
        let units = self.compose()?;
        for unit in &units {
            self.grant(unit)?;
        }
        for unit in &units {
            self.bind(unit)?;
        }
        self.register_on_demand()?;
        self.finish()
    }
}
