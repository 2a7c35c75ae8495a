//! flowdeck-bind — turns granted task definitions into services.
//!
//! Each persistent unit becomes exactly one service carrying exactly one
//! attachment, chosen by traffic class:
//!
//! ```text
//! GrantedTask ──► ServiceBinder::bind(class)
//!                   ├── Public          → LoadBalancerBinding
//!                   │                       (HTTP /health on traffic port,
//!                   │                        60s deregistration delay)
//!                   └── InternalScaled  → AutoscalingPolicy
//!                                           (min/max, optional CPU and
//!                                            memory triggers, 60s cooldown)
//! ```
//!
//! The binder enforces the cross-service rules: one load balancer per
//! deployment, and a task definition never carries both attachments.
//! Every service also receives ingress rules on the shared security group,
//! controlled by [`IngressPolicy`].

pub mod autoscale;
pub mod binder;
pub mod error;
pub mod ingress;
pub mod load_balancer;

pub use autoscale::{AutoscalingPolicy, AutoscalingSettings, ScalingMetric, ScalingTrigger};
pub use binder::{AttachmentKind, Service, ServiceAttachment, ServiceBinder};
pub use error::{BindError, BindResult};
pub use ingress::{IngressPolicy, IngressRule};
pub use load_balancer::{HealthCheck, LoadBalancerBinding, LoadBalancerSettings};
