//! Container image sources and resolution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Registry image: oci://registry.example.com/airflow:2.1.0
    Registry { registry: String, repository: String, tag: String },
    /// Local build context: asset://./airflow or ./airflow
    Asset { directory: String },
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid image URI: {0}")]
    InvalidUri(String),
}

impl ImageSource {
    pub fn parse(uri: &str) -> Result<Self, ImageError> {
        if let Some(rest) = uri.strip_prefix("oci://") {
            let (repo_path, tag) = match rest.rsplit_once(':') {
                // A colon inside the registry host (port) is not a tag.
                Some((path, tag)) if !tag.contains('/') => (path, tag),
                _ => (rest, "latest"),
            };
            let (registry, repository) = repo_path
                .split_once('/')
                .ok_or_else(|| ImageError::InvalidUri(uri.to_string()))?;
            if repository.is_empty() || tag.is_empty() {
                return Err(ImageError::InvalidUri(uri.to_string()));
            }
            Ok(ImageSource::Registry {
                registry: registry.to_string(),
                repository: repository.to_string(),
                tag: tag.to_string(),
            })
        } else if let Some(dir) = uri.strip_prefix("asset://") {
            if dir.is_empty() {
                return Err(ImageError::InvalidUri(uri.to_string()));
            }
            Ok(ImageSource::Asset { directory: dir.to_string() })
        } else if uri.starts_with("./") || uri.starts_with('/') {
            Ok(ImageSource::Asset { directory: uri.to_string() })
        } else {
            Err(ImageError::UnsupportedScheme(uri.to_string()))
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ImageSource::Registry { .. } => "oci",
            ImageSource::Asset { .. } => "asset",
        }
    }
}

/// Opaque reference to a deployable image, as produced by the packaging
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns an image source into a deployable reference.
///
/// Implementations typically build and push asset directories. Errors are
/// handed back to the caller untouched.
pub trait ImageResolver {
    fn resolve(&self, role: &str, source: &ImageSource) -> anyhow::Result<ImageRef>;
}

/// Resolver that performs no builds: registry images map to their
/// canonical `registry/repository:tag`, assets to `asset:<dir>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl ImageResolver for PassthroughResolver {
    fn resolve(&self, _role: &str, source: &ImageSource) -> anyhow::Result<ImageRef> {
        Ok(match source {
            ImageSource::Registry { registry, repository, tag } => {
                ImageRef(format!("{registry}/{repository}:{tag}"))
            }
            ImageSource::Asset { directory } => ImageRef(format!("asset:{directory}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oci() {
        let src = ImageSource::parse("oci://registry.example.com/airflow:2.1.0").unwrap();
        assert_eq!(src.scheme(), "oci");
        match src {
            ImageSource::Registry { registry, repository, tag } => {
                assert_eq!(registry, "registry.example.com");
                assert_eq!(repository, "airflow");
                assert_eq!(tag, "2.1.0");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_oci_default_tag() {
        let src = ImageSource::parse("oci://localhost:5000/team/airflow").unwrap();
        assert_eq!(
            src,
            ImageSource::Registry {
                registry: "localhost:5000".to_string(),
                repository: "team/airflow".to_string(),
                tag: "latest".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_asset() {
        let src = ImageSource::parse("asset://./airflow").unwrap();
        assert_eq!(src, ImageSource::Asset { directory: "./airflow".to_string() });
        let src = ImageSource::parse("./tasks/odd_numbers").unwrap();
        assert_eq!(src.scheme(), "asset");
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(matches!(
            ImageSource::parse("ftp://example.com/img"),
            Err(ImageError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ImageSource::parse("oci://no-repository"),
            Err(ImageError::InvalidUri(_))
        ));
    }

    #[test]
    fn passthrough_resolver_formats_references() {
        let r = PassthroughResolver;
        let reg = ImageSource::parse("oci://ghcr.io/acme/airflow:1").unwrap();
        assert_eq!(r.resolve("webserver", &reg).unwrap().as_str(), "ghcr.io/acme/airflow:1");
        let asset = ImageSource::parse("asset://./airflow").unwrap();
        assert_eq!(r.resolve("webserver", &asset).unwrap().as_str(), "asset:./airflow");
    }
}
