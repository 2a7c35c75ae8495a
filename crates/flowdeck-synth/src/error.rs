//! Synthesis error types.

use thiserror::Error;

use flowdeck_bind::BindError;
use flowdeck_compose::ComposeError;
use flowdeck_core::CatalogError;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("binding error: {0}")]
    Bind(#[from] BindError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unit {unit} bound before its capability grants were attached")]
    OrderingViolation { unit: String },

    #[error("unit {0} was composed but never bound to a service")]
    Unbound(String),

    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("stage {0} already ran")]
    StageRepeated(&'static str),

    #[error("stage {0} has not run yet")]
    StageSkipped(&'static str),
}

pub type SynthResult<T> = Result<T, SynthError>;
