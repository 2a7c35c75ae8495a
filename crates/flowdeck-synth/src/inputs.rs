//! Everything a synthesis needs, resolved from `flowdeck.toml`.

use std::collections::BTreeMap;

use tracing::debug;

use flowdeck_bind::{AutoscalingSettings, IngressPolicy, LoadBalancerSettings};
use flowdeck_compose::{Effect, PolicyStatement, RuntimeEnvironment, StaticCapabilities};
use flowdeck_core::config::{AutoscalingConfig, LoadBalancerConfig, StatementConfig};
use flowdeck_core::{
    ClusterHandle, DeployConfig, FilesystemDescriptor, ImageSource, LogSink, RoleCatalog,
};

use crate::error::{SynthError, SynthResult};

/// Extra registration details for an on-demand role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnDemandJob {
    /// Task family; `<deployment>-<role>` when absent.
    pub family: Option<String>,
    pub filesystem: Option<FilesystemDescriptor>,
}

#[derive(Debug, Clone)]
pub struct DeploymentInputs {
    pub name: String,
    pub cluster: ClusterHandle,
    pub catalog: RoleCatalog,
    pub create_worker_pool: bool,
    pub image: ImageSource,
    pub log_sink: LogSink,
    pub environment: RuntimeEnvironment,
    pub capabilities: StaticCapabilities,
    pub load_balancer: LoadBalancerSettings,
    pub autoscaling: AutoscalingSettings,
    pub ingress: IngressPolicy,
    /// Keyed by on-demand role name.
    pub on_demand: BTreeMap<String, OnDemandJob>,
}

impl DeploymentInputs {
    /// Inputs with the standard catalog and default settings.
    pub fn new(
        name: &str,
        cluster: ClusterHandle,
        image: ImageSource,
        environment: RuntimeEnvironment,
    ) -> Self {
        Self {
            name: name.to_string(),
            cluster,
            catalog: RoleCatalog::standard(),
            create_worker_pool: true,
            image,
            log_sink: LogSink {
                stream_prefix: name.to_string(),
                retention_days: 30,
            },
            environment,
            capabilities: StaticCapabilities::default(),
            load_balancer: LoadBalancerSettings::default(),
            autoscaling: AutoscalingSettings::default(),
            ingress: IngressPolicy::default(),
            on_demand: BTreeMap::new(),
        }
    }

    /// Resolve a parsed config. Builds the runtime environment, which
    /// generates a fresh admin secret.
    pub fn from_config(config: &DeployConfig) -> SynthResult<Self> {
        let catalog = config.catalog().map_err(config_error)?;
        let image = config.image_source().map_err(config_error)?;

        let mut env = RuntimeEnvironment::builder(&config.cluster, &config.backing_store.connection);
        if let Some(url) = &config.deployment.broker_url {
            env = env.broker_url(url.clone());
        }
        if let Some(executor) = &config.deployment.executor {
            env = env.executor(executor.clone());
        }
        if let Some(extra) = &config.env {
            env = env.extra(extra.clone());
        }
        let environment = env.build()?;

        let ingress = match &config.deployment.ingress {
            Some(policy) => policy.parse::<IngressPolicy>()?,
            None => IngressPolicy::default(),
        };

        let capabilities = match &config.capabilities {
            Some(caps) => StaticCapabilities {
                managed: caps.managed.clone(),
                statements: caps
                    .statements
                    .iter()
                    .map(statement_from_config)
                    .collect::<SynthResult<Vec<_>>>()?,
            },
            None => StaticCapabilities::default(),
        };

        let on_demand = config
            .on_demand
            .iter()
            .map(|job| {
                (
                    job.name.clone(),
                    OnDemandJob {
                        family: job.family.clone(),
                        filesystem: job.filesystem.clone(),
                    },
                )
            })
            .collect();

        debug!(
            deployment = %config.deployment.name,
            roles = catalog.len(),
            ingress = %ingress,
            "deployment inputs resolved"
        );

        Ok(Self {
            name: config.deployment.name.clone(),
            cluster: config.cluster.clone(),
            catalog,
            create_worker_pool: config.deployment.create_worker_pool,
            image,
            log_sink: config.log_sink(),
            environment,
            capabilities,
            load_balancer: config
                .load_balancer
                .as_ref()
                .map(load_balancer_from_config)
                .unwrap_or_default(),
            autoscaling: config
                .autoscaling
                .as_ref()
                .map(autoscaling_from_config)
                .unwrap_or_default(),
            ingress,
            on_demand,
        })
    }
}

fn config_error(err: anyhow::Error) -> SynthError {
    SynthError::Config(format!("{err:#}"))
}

fn statement_from_config(stmt: &StatementConfig) -> SynthResult<PolicyStatement> {
    let effect = match stmt.effect.as_deref().unwrap_or("allow") {
        "allow" => Effect::Allow,
        "deny" => Effect::Deny,
        other => {
            return Err(SynthError::Config(format!("unknown statement effect '{other}'")));
        }
    };
    if stmt.actions.is_empty() {
        return Err(SynthError::Config("policy statement has no actions".to_string()));
    }
    Ok(PolicyStatement {
        effect,
        actions: stmt.actions.clone(),
        resources: stmt.resources.clone(),
    })
}

fn load_balancer_from_config(cfg: &LoadBalancerConfig) -> LoadBalancerSettings {
    let defaults = LoadBalancerSettings::default();
    LoadBalancerSettings {
        listener_port: cfg.listener_port.unwrap_or(defaults.listener_port),
        health_path: cfg.health_path.clone().unwrap_or(defaults.health_path),
        deregistration_delay_secs: cfg
            .deregistration_delay_secs
            .unwrap_or(defaults.deregistration_delay_secs),
    }
}

fn autoscaling_from_config(cfg: &AutoscalingConfig) -> AutoscalingSettings {
    AutoscalingSettings {
        min_count: cfg.min_count,
        max_count: cfg.max_count,
        cpu_target_percent: cfg.cpu_target_percent,
        memory_target_percent: cfg.memory_target_percent,
        cooldown_secs: cfg
            .cooldown_secs
            .unwrap_or(AutoscalingSettings::default().cooldown_secs),
    }
}
