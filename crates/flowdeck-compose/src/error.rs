//! Composition error types.

use thiserror::Error;

/// Configuration defects detected while composing task definitions.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no persistent roles to compose")]
    NoRoles,

    #[error("role {role} is on-demand and cannot join a service unit")]
    NotPersistent { role: String },

    #[error("role {role} has no container port")]
    MissingPort { role: String },

    #[error("role {role} is isolated and not absorbable, but the worker pool is disabled")]
    NoAbsorptionTarget { role: String },

    #[error("role {role} must be absorbed but no co-located role defines a shared unit")]
    NoSharedUnit { role: String },

    #[error("role name '{0}' collides with the shared unit key")]
    ReservedUnitName(String),

    #[error("unit {unit}: port {port} claimed by both {first} and {second}")]
    PortConflict {
        unit: String,
        port: u16,
        first: String,
        second: String,
    },

    #[error("environment variable {0} is managed by flowdeck and cannot be overridden")]
    ReservedVariable(String),

    #[error("on-demand task already registered: {0}")]
    DuplicateTask(String),

    #[error("task {family}: volume {volume} declared without filesystem access capability")]
    MissingFilesystemGrant { family: String, volume: String },

    #[error("task {family}: filesystem access granted without a declared volume")]
    OrphanFilesystemGrant { family: String },

    #[error("task {family}: mount point references unknown volume {volume}")]
    UnknownVolume { family: String, volume: String },

    /// Failure reported by an external collaborator (image build, etc.).
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type ComposeResult<T> = Result<T, ComposeError>;
