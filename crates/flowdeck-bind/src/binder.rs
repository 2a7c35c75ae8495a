//! Service binder.
//!
//! Wraps a granted task definition in a service and attaches exactly one
//! of {load balancer, autoscaling policy}. The binder keeps track of what
//! it has already bound so the deployment-wide rules hold regardless of
//! call order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flowdeck_compose::{GrantedTask, TaskDefinition};
use flowdeck_core::{ClusterHandle, TrafficClass};

use crate::autoscale::{AutoscalingPolicy, AutoscalingSettings};
use crate::error::{BindError, BindResult};
use crate::ingress::{IngressPolicy, IngressRule};
use crate::load_balancer::{LoadBalancerBinding, LoadBalancerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    LoadBalancer,
    Autoscaling,
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentKind::LoadBalancer => f.write_str("a load balancer"),
            AttachmentKind::Autoscaling => f.write_str("an autoscaling policy"),
        }
    }
}

/// The single runtime behavior attached to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceAttachment {
    LoadBalancer(LoadBalancerBinding),
    Autoscaling(AutoscalingPolicy),
}

impl ServiceAttachment {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            ServiceAttachment::LoadBalancer(_) => AttachmentKind::LoadBalancer,
            ServiceAttachment::Autoscaling(_) => AttachmentKind::Autoscaling,
        }
    }
}

/// A running, scaled instance of one task definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    pub cluster: String,
    pub traffic: TrafficClass,
    pub desired_count: u32,
    pub security_group: String,
    pub subnets: Vec<String>,
    pub ingress: Vec<IngressRule>,
    pub attachment: ServiceAttachment,
    #[serde(skip)]
    definition: TaskDefinition,
}

impl Service {
    pub fn family(&self) -> &str {
        self.definition.family()
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn load_balancer(&self) -> Option<&LoadBalancerBinding> {
        match &self.attachment {
            ServiceAttachment::LoadBalancer(lb) => Some(lb),
            ServiceAttachment::Autoscaling(_) => None,
        }
    }

    pub fn autoscaling(&self) -> Option<&AutoscalingPolicy> {
        match &self.attachment {
            ServiceAttachment::Autoscaling(policy) => Some(policy),
            ServiceAttachment::LoadBalancer(_) => None,
        }
    }
}

/// Binds granted tasks to services for one deployment.
pub struct ServiceBinder {
    cluster: ClusterHandle,
    load_balancer: LoadBalancerSettings,
    autoscaling: AutoscalingSettings,
    ingress: IngressPolicy,
    /// family → attachment already bound to it.
    bound: BTreeMap<String, AttachmentKind>,
    /// Family holding the deployment's only load balancer.
    load_balancer_owner: Option<String>,
}

impl ServiceBinder {
    pub fn new(cluster: ClusterHandle) -> Self {
        Self {
            cluster,
            load_balancer: LoadBalancerSettings::default(),
            autoscaling: AutoscalingSettings::default(),
            ingress: IngressPolicy::default(),
            bound: BTreeMap::new(),
            load_balancer_owner: None,
        }
    }

    pub fn with_load_balancer(mut self, settings: LoadBalancerSettings) -> Self {
        self.load_balancer = settings;
        self
    }

    pub fn with_autoscaling(mut self, settings: AutoscalingSettings) -> Self {
        self.autoscaling = settings;
        self
    }

    pub fn with_ingress(mut self, policy: IngressPolicy) -> Self {
        self.ingress = policy;
        self
    }

    /// Create the service for `task` with the attachment matching `class`.
    pub fn bind(&mut self, task: GrantedTask, class: TrafficClass) -> BindResult<Service> {
        let family = task.family().to_string();

        let requested = match class {
            TrafficClass::Public => AttachmentKind::LoadBalancer,
            TrafficClass::InternalScaled => AttachmentKind::Autoscaling,
            TrafficClass::OnDemand => return Err(BindError::NotPersistent { family }),
        };

        if let Some(&existing) = self.bound.get(&family) {
            return Err(if existing == requested {
                BindError::AlreadyBound { family, kind: existing }
            } else {
                BindError::ConflictingAttachment { family, existing, requested }
            });
        }

        let definition = task.into_definition();
        let (attachment, desired_count) = match requested {
            AttachmentKind::LoadBalancer => {
                if let Some(existing) = &self.load_balancer_owner {
                    return Err(BindError::LoadBalancerAlreadyBound {
                        existing: existing.clone(),
                        requested: family,
                    });
                }
                let port = definition
                    .public_port()
                    .or_else(|| definition.ports().first().copied())
                    .ok_or_else(|| BindError::NoTrafficPort { family: family.clone() })?;
                let lb = LoadBalancerBinding::new(&family, port, &self.load_balancer);
                debug!(family = %family, target_port = port, "load balancer attached");
                (ServiceAttachment::LoadBalancer(lb), 1)
            }
            AttachmentKind::Autoscaling => {
                let policy = AutoscalingPolicy::from_settings(&self.autoscaling)?;
                debug!(
                    family = %family,
                    min = policy.min_count,
                    max = policy.max_count,
                    triggers = policy.triggers.len(),
                    "autoscaling attached"
                );
                let min = policy.min_count;
                (ServiceAttachment::Autoscaling(policy), min)
            }
        };

        let ingress = self
            .ingress
            .rules_for(&definition, &self.cluster.security_group_id);

        if requested == AttachmentKind::LoadBalancer {
            self.load_balancer_owner = Some(family.clone());
        }
        self.bound.insert(family.clone(), requested);

        info!(
            family = %family,
            class = class.label(),
            ingress_rules = ingress.len(),
            "service bound"
        );

        Ok(Service {
            name: format!("{family}-service"),
            cluster: self.cluster.name.clone(),
            traffic: class,
            desired_count,
            security_group: self.cluster.security_group_id.clone(),
            subnets: self.cluster.subnet_ids.clone(),
            ingress,
            attachment,
            definition,
        })
    }

    /// Family holding the load balancer, if one has been bound.
    pub fn load_balancer_owner(&self) -> Option<&str> {
        self.load_balancer_owner.as_deref()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_compose::{
        AccessPolicyAttacher, ContainerSpec, PortMapping, RuntimeEnvironment, StaticCapabilities,
    };
    use flowdeck_core::{ImageRef, LogSink, ResourceShape};

    use crate::autoscale::ScalingMetric;

    fn cluster() -> ClusterHandle {
        ClusterHandle {
            name: "flow-cluster".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_ids: vec!["subnet-a".to_string()],
            security_group_id: "sg-1".to_string(),
        }
    }

    fn granted(family: &str, roles: &[(&str, u16, TrafficClass)]) -> GrantedTask {
        let mut td = TaskDefinition::new(family);
        for (role, port, traffic) in roles {
            td.add_container(ContainerSpec {
                role: role.to_string(),
                traffic: *traffic,
                image: ImageRef("registry/airflow:1".to_string()),
                entry_point: None,
                environment: RuntimeEnvironment::empty(),
                port_mappings: vec![PortMapping {
                    container_port: *port,
                    protocol: "tcp".to_string(),
                }],
                resources: ResourceShape { cpu_units: 256, memory_mib: 512 },
                log_sink: LogSink {
                    stream_prefix: "flow".to_string(),
                    retention_days: 30,
                },
                mount_points: Vec::new(),
            })
            .unwrap();
        }
        let source = StaticCapabilities::default();
        AccessPolicyAttacher::new(&source).attach(td)
    }

    fn primary() -> GrantedTask {
        granted(
            "flow-primary",
            &[
                ("scheduler", 8081, TrafficClass::InternalScaled),
                ("webserver", 8080, TrafficClass::Public),
            ],
        )
    }

    fn worker() -> GrantedTask {
        granted("flow-worker", &[("worker", 8082, TrafficClass::InternalScaled)])
    }

    #[test]
    fn public_service_gets_load_balancer_on_public_port() {
        let mut binder = ServiceBinder::new(cluster());
        let service = binder.bind(primary(), TrafficClass::Public).unwrap();

        let lb = service.load_balancer().unwrap();
        assert_eq!(lb.target_port, 8080);
        assert_eq!(lb.health_check.path, "/health");
        assert_eq!(lb.deregistration_delay_secs, 60);
        assert!(service.autoscaling().is_none());
        assert_eq!(service.desired_count, 1);
        assert_eq!(service.name, "flow-primary-service");
        assert_eq!(binder.load_balancer_owner(), Some("flow-primary"));
    }

    #[test]
    fn internal_service_gets_autoscaling() {
        let mut binder = ServiceBinder::new(cluster()).with_autoscaling(AutoscalingSettings {
            min_count: 2,
            max_count: 6,
            cpu_target_percent: Some(70),
            memory_target_percent: None,
            cooldown_secs: 60,
        });
        let service = binder.bind(worker(), TrafficClass::InternalScaled).unwrap();

        let policy = service.autoscaling().unwrap();
        assert_eq!((policy.min_count, policy.max_count), (2, 6));
        assert_eq!(policy.triggers.len(), 1);
        assert_eq!(policy.triggers[0].metric, ScalingMetric::CpuUtilization);
        assert!(service.load_balancer().is_none());
        assert_eq!(service.desired_count, 2);
    }

    #[test]
    fn second_load_balancer_is_rejected() {
        let mut binder = ServiceBinder::new(cluster());
        binder.bind(primary(), TrafficClass::Public).unwrap();

        let other = granted("flow-api", &[("api", 9000, TrafficClass::Public)]);
        let err = binder.bind(other, TrafficClass::Public).unwrap_err();
        assert_eq!(
            err,
            BindError::LoadBalancerAlreadyBound {
                existing: "flow-primary".to_string(),
                requested: "flow-api".to_string(),
            }
        );
    }

    #[test]
    fn mixing_attachments_on_one_task_is_rejected() {
        let mut binder = ServiceBinder::new(cluster());
        binder.bind(worker(), TrafficClass::InternalScaled).unwrap();

        let err = binder.bind(worker(), TrafficClass::Public).unwrap_err();
        assert_eq!(
            err,
            BindError::ConflictingAttachment {
                family: "flow-worker".to_string(),
                existing: AttachmentKind::Autoscaling,
                requested: AttachmentKind::LoadBalancer,
            }
        );
        // The rejected attempt must not claim the load balancer slot.
        assert_eq!(binder.load_balancer_owner(), None);

        let err = binder.bind(worker(), TrafficClass::InternalScaled).unwrap_err();
        assert!(matches!(err, BindError::AlreadyBound { .. }));

        let mut binder = ServiceBinder::new(cluster());
        binder.bind(primary(), TrafficClass::Public).unwrap();
        let err = binder.bind(primary(), TrafficClass::InternalScaled).unwrap_err();
        assert!(matches!(
            err,
            BindError::ConflictingAttachment { existing: AttachmentKind::LoadBalancer, .. }
        ));
    }

    #[test]
    fn on_demand_class_cannot_be_bound() {
        let mut binder = ServiceBinder::new(cluster());
        let err = binder.bind(worker(), TrafficClass::OnDemand).unwrap_err();
        assert!(matches!(err, BindError::NotPersistent { .. }));
        assert_eq!(binder.bound_count(), 0);
    }

    #[test]
    fn ingress_follows_policy() {
        let mut binder = ServiceBinder::new(cluster());
        let service = binder.bind(primary(), TrafficClass::Public).unwrap();
        let ports: Vec<(u16, u16)> = service.ingress.iter().map(|r| (r.from_port, r.to_port)).collect();
        assert_eq!(ports, vec![(8080, 8080), (8081, 8081)]);

        let mut binder = ServiceBinder::new(cluster()).with_ingress(IngressPolicy::AllPorts);
        let service = binder.bind(worker(), TrafficClass::InternalScaled).unwrap();
        assert_eq!(service.ingress.len(), 1);
        assert_eq!((service.ingress[0].from_port, service.ingress[0].to_port), (0, 65535));
        assert_eq!(service.ingress[0].source_security_group, "sg-1");
    }

    #[test]
    fn invalid_scaling_settings_fail_the_bind() {
        let mut binder = ServiceBinder::new(cluster()).with_autoscaling(AutoscalingSettings {
            min_count: 5,
            max_count: 2,
            ..AutoscalingSettings::default()
        });
        let err = binder.bind(worker(), TrafficClass::InternalScaled).unwrap_err();
        assert!(matches!(err, BindError::InvalidScaling(_)));
        assert_eq!(binder.bound_count(), 0);
    }

    #[test]
    fn public_binding_without_ports_fails() {
        let mut binder = ServiceBinder::new(cluster());
        let empty = granted("flow-empty", &[]);
        let err = binder.bind(empty, TrafficClass::Public).unwrap_err();
        assert!(matches!(err, BindError::NoTrafficPort { .. }));
        assert_eq!(binder.load_balancer_owner(), None);
    }
}
