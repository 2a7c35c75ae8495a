//! Binder error types.

use thiserror::Error;

use crate::binder::AttachmentKind;

/// Errors raised while binding services.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("task {family} is on-demand and cannot be bound to a service")]
    NotPersistent { family: String },

    #[error("load balancer already bound to {existing}; refusing a second one for {requested}")]
    LoadBalancerAlreadyBound { existing: String, requested: String },

    #[error("task {family} already has {existing}; cannot also attach {requested}")]
    ConflictingAttachment {
        family: String,
        existing: AttachmentKind,
        requested: AttachmentKind,
    },

    #[error("task {family} is already bound with {kind}")]
    AlreadyBound { family: String, kind: AttachmentKind },

    #[error("task {family} exposes no port to route traffic to")]
    NoTrafficPort { family: String },

    #[error("invalid autoscaling settings: {0}")]
    InvalidScaling(String),

    #[error("unknown ingress policy: {0}")]
    UnknownIngressPolicy(String),
}

pub type BindResult<T> = Result<T, BindError>;
