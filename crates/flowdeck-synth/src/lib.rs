//! flowdeck-synth — staged synthesis of a deployment topology.
//!
//! Drives the build in dependency order and refuses to skip a stage:
//!
//! ```text
//! DeploymentInputs (config, catalog, runtime environment)
//!   └── Synthesizer
//!         ├── compose()          TaskComposer → DeploymentUnits
//!         ├── grant(unit)        AccessPolicyAttacher → GrantedTask
//!         ├── bind(unit)         ServiceBinder → Service
//!         ├── register_on_demand()
//!         └── finish()           → Topology + outputs
//! ```
//!
//! Binding a unit that has been composed but not granted is an ordering
//! violation. Any error aborts the whole synthesis before a topology is
//! produced; there is no partial result.

pub mod error;
pub mod inputs;
pub mod pipeline;
pub mod report;
pub mod topology;

pub use error::{SynthError, SynthResult};
pub use inputs::{DeploymentInputs, OnDemandJob};
pub use pipeline::Synthesizer;
pub use report::format_topology;
pub use topology::{Allocation, DeploymentOutput, OnDemandSummary, OutputValue, Topology, UnitSummary};
