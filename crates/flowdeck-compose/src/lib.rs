//! flowdeck-compose — turns a role catalog into task definitions.
//!
//! Every stage here is a pure, single-pass build step. Nothing is
//! provisioned; the output is handed to `flowdeck-bind` and finally
//! rendered by `flowdeck-synth`.
//!
//! # Pipeline
//!
//! ```text
//! RuntimeEnvironment (built once, immutable)
//!   └── TaskComposer
//!         ├── Shared(primary)      co-located roles + absorbed workers
//!         └── Dedicated(<role>)    isolated roles, worker pool enabled
//!               └── AccessPolicyAttacher → GrantedTask
//!
//! OnDemandRegistry (independent)
//!   └── OnDemandTask  optional volume + mount + filesystem grant
//! ```
//!
//! A `GrantedTask` can only be produced by the attacher, which is how the
//! binder is kept from starting a service on an ungranted identity.

pub mod composer;
pub mod env;
pub mod error;
pub mod on_demand;
pub mod policy;
pub mod task;

pub use composer::{Composition, TaskComposer};
pub use env::{RuntimeEnvironment, RuntimeEnvironmentBuilder};
pub use error::{ComposeError, ComposeResult};
pub use on_demand::{OnDemandRegistry, OnDemandSpec, OnDemandTask, RegistrationState};
pub use policy::{
    AccessPolicyAttacher, CapabilitySource, Effect, ExecutionIdentity, FILESYSTEM_READ_WRITE,
    GrantedTask, PolicyStatement, StaticCapabilities,
};
pub use task::{
    ContainerSpec, DeploymentUnit, MountPoint, NetworkMode, PRIMARY_UNIT, PortMapping,
    TaskDefinition, UnitKey, Volume,
};
