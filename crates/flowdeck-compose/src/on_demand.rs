//! On-demand task registry.
//!
//! Builds standalone task definitions for jobs launched by an external
//! trigger (a workflow scheduler running one task per job). They are never
//! wrapped in a service; the registry only tracks whether a family has been
//! defined.
//!
//! A filesystem descriptor expands into three pieces that are applied
//! together: a named volume, a read-write mount on the job container, and
//! the filesystem access capability on the execution identity.

use std::collections::BTreeMap;

use tracing::{debug, info};

use flowdeck_core::{FilesystemDescriptor, ImageResolver, ImageSource, LogSink, ResourceShape, TrafficClass};

use crate::env::RuntimeEnvironment;
use crate::error::{ComposeError, ComposeResult};
use crate::policy::{FILESYSTEM_READ_WRITE, grant_filesystem_access};
use crate::task::{ContainerSpec, MountPoint, TaskDefinition, Volume};

/// Inputs for one on-demand job.
#[derive(Debug, Clone)]
pub struct OnDemandSpec {
    pub family: String,
    pub container_name: String,
    pub image: ImageSource,
    pub resources: ResourceShape,
    pub log_sink: LogSink,
    pub filesystem: Option<FilesystemDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    /// The task definition exists. Running instances belong to the
    /// external trigger.
    Defined,
}

/// A registered on-demand task definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OnDemandTask {
    definition: TaskDefinition,
}

impl OnDemandTask {
    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn family(&self) -> &str {
        self.definition.family()
    }

    /// Check that volumes, mounts and the filesystem capability agree.
    pub fn validate(&self) -> ComposeResult<()> {
        validate_filesystem(&self.definition)
    }
}

pub struct OnDemandRegistry<'a> {
    resolver: &'a dyn ImageResolver,
    tasks: BTreeMap<String, OnDemandTask>,
}

impl<'a> OnDemandRegistry<'a> {
    pub fn new(resolver: &'a dyn ImageResolver) -> Self {
        Self {
            resolver,
            tasks: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, spec: OnDemandSpec) -> ComposeResult<&OnDemandTask> {
        if self.tasks.contains_key(&spec.family) {
            return Err(ComposeError::DuplicateTask(spec.family));
        }

        let image = self.resolver.resolve(&spec.container_name, &spec.image)?;
        let mut definition = TaskDefinition::new(&spec.family);
        let mut container = ContainerSpec {
            role: spec.container_name.clone(),
            traffic: TrafficClass::OnDemand,
            image,
            entry_point: None,
            environment: RuntimeEnvironment::empty(),
            port_mappings: Vec::new(),
            resources: spec.resources,
            log_sink: spec.log_sink,
            mount_points: Vec::new(),
        };

        if let Some(fs) = &spec.filesystem {
            definition.add_volume(Volume {
                name: fs.volume_name.clone(),
                filesystem_id: fs.filesystem_id.clone(),
            });
            container.mount_points.push(MountPoint {
                source_volume: fs.volume_name.clone(),
                container_path: fs.container_path.clone(),
                read_only: false,
            });
            grant_filesystem_access(&mut definition);
            debug!(
                family = %spec.family,
                filesystem = %fs.filesystem_id,
                path = %fs.container_path,
                "shared filesystem mounted"
            );
        }

        definition.add_container(container)?;
        let task = OnDemandTask { definition };
        task.validate()?;

        info!(
            family = %spec.family,
            filesystem = spec.filesystem.is_some(),
            "on-demand task defined"
        );
        Ok(self.tasks.entry(spec.family).or_insert(task))
    }

    pub fn state(&self, family: &str) -> RegistrationState {
        if self.tasks.contains_key(family) {
            RegistrationState::Defined
        } else {
            RegistrationState::Unregistered
        }
    }

    pub fn get(&self, family: &str) -> Option<&OnDemandTask> {
        self.tasks.get(family)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &OnDemandTask> {
        self.tasks.values()
    }

    pub fn into_tasks(self) -> Vec<OnDemandTask> {
        self.tasks.into_values().collect()
    }
}

/// Volumes, mounts and the filesystem capability must all be present or
/// all be absent.
pub(crate) fn validate_filesystem(definition: &TaskDefinition) -> ComposeResult<()> {
    let family = definition.family().to_string();
    let granted = definition.execution_identity().has_managed(FILESYSTEM_READ_WRITE);

    for container in definition.containers() {
        for mount in &container.mount_points {
            if !definition.volumes().iter().any(|v| v.name == mount.source_volume) {
                return Err(ComposeError::UnknownVolume {
                    family,
                    volume: mount.source_volume.clone(),
                });
            }
        }
    }

    match (definition.volumes().first(), granted) {
        (Some(volume), false) => Err(ComposeError::MissingFilesystemGrant {
            family,
            volume: volume.name.clone(),
        }),
        (None, true) => Err(ComposeError::OrphanFilesystemGrant { family }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdeck_core::PassthroughResolver;

    fn spec(family: &str, filesystem: Option<FilesystemDescriptor>) -> OnDemandSpec {
        OnDemandSpec {
            family: family.to_string(),
            container_name: "odd-numbers".to_string(),
            image: ImageSource::parse("asset://./tasks/odd_numbers").unwrap(),
            resources: ResourceShape { cpu_units: 256, memory_mib: 512 },
            log_sink: LogSink {
                stream_prefix: "flow".to_string(),
                retention_days: 30,
            },
            filesystem,
        }
    }

    fn shared_fs() -> FilesystemDescriptor {
        FilesystemDescriptor {
            volume_name: "shared".to_string(),
            filesystem_id: "fs-1234".to_string(),
            container_path: "/mnt/shared".to_string(),
        }
    }

    #[test]
    fn filesystem_descriptor_adds_volume_mount_and_grant() {
        let resolver = PassthroughResolver;
        let mut registry = OnDemandRegistry::new(&resolver);
        let task = registry.register(spec("flow-odd", Some(shared_fs()))).unwrap();
        let td = task.definition();

        assert_eq!(td.volumes().len(), 1);
        assert_eq!(td.volumes()[0].filesystem_id, "fs-1234");
        let mounts = &td.containers()[0].mount_points;
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source_volume, "shared");
        assert!(!mounts[0].read_only);
        assert!(td.execution_identity().has_managed(FILESYSTEM_READ_WRITE));
        assert_eq!(td.traffic(), TrafficClass::OnDemand);
    }

    #[test]
    fn no_descriptor_means_no_volume_and_no_grant() {
        let resolver = PassthroughResolver;
        let mut registry = OnDemandRegistry::new(&resolver);
        let task = registry.register(spec("flow-odd", None)).unwrap();
        let td = task.definition();

        assert!(td.volumes().is_empty());
        assert!(td.containers()[0].mount_points.is_empty());
        assert!(!td.execution_identity().has_managed(FILESYSTEM_READ_WRITE));
        assert!(td.containers()[0].environment.is_empty());
    }

    #[test]
    fn registration_state_transitions() {
        let resolver = PassthroughResolver;
        let mut registry = OnDemandRegistry::new(&resolver);
        assert_eq!(registry.state("flow-odd"), RegistrationState::Unregistered);
        registry.register(spec("flow-odd", None)).unwrap();
        assert_eq!(registry.state("flow-odd"), RegistrationState::Defined);
        assert_eq!(registry.tasks().count(), 1);
    }

    #[test]
    fn duplicate_family_is_rejected() {
        let resolver = PassthroughResolver;
        let mut registry = OnDemandRegistry::new(&resolver);
        registry.register(spec("flow-odd", None)).unwrap();
        let err = registry.register(spec("flow-odd", None)).unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateTask(f) if f == "flow-odd"));
    }

    #[test]
    fn volume_without_grant_is_a_defect() {
        let mut td = TaskDefinition::new("flow-bad");
        td.add_volume(Volume {
            name: "shared".to_string(),
            filesystem_id: "fs-1".to_string(),
        });
        let err = validate_filesystem(&td).unwrap_err();
        assert!(matches!(err, ComposeError::MissingFilesystemGrant { .. }));
    }

    #[test]
    fn grant_without_volume_is_a_defect() {
        let mut td = TaskDefinition::new("flow-bad");
        grant_filesystem_access(&mut td);
        let err = validate_filesystem(&td).unwrap_err();
        assert!(matches!(err, ComposeError::OrphanFilesystemGrant { .. }));
    }
}
