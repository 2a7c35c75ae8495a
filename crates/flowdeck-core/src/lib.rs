pub mod catalog;
pub mod config;
pub mod image;
pub mod types;

pub use catalog::{CatalogError, RoleCatalog};
pub use config::DeployConfig;
pub use image::{ImageRef, ImageResolver, ImageSource, PassthroughResolver};
pub use types::*;
