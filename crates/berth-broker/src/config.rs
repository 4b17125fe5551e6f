//! Configuration loading for the broker.
//!
//! Store endpoints are described in a YAML file mirroring the per-store
//! config objects the route layer hands in. Environment variables override
//! the endpoint hosts so deployments can re-point stores without editing
//! the file:
//!
//! - `BERTH_RELATIONAL_HOST` overrides `relational.host`
//! - `BERTH_RELATIONAL_SUB_HOST` overrides `relational.sub_host`
//! - `BERTH_CACHE_HOST` overrides `cache.host`
//! - `BERTH_DOCUMENT_ORIGINS` (comma-separated) overrides
//!   `document.origins`
//!
//! Overrides apply only to sections present in the file; an absent store
//! section stays absent.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use berth_core::descriptor::EndpointDescriptor;
use berth_stores::cache::CacheEndpoint;
use berth_stores::document::DocumentEndpoint;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

const fn default_relational_port() -> u16 {
    5432
}

const fn default_cache_port() -> u16 {
    6379
}

/// Relational store section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationalSettings {
    /// Primary host address.
    pub host: String,

    /// TCP port (shared by primary and secondary hosts).
    #[serde(default = "default_relational_port")]
    pub port: u16,

    /// User name.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Secondary (failover) host address.
    #[serde(default)]
    pub sub_host: Option<String>,

    /// Pool-size hint; derived from CPU count when absent.
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

impl RelationalSettings {
    /// Build the endpoint descriptor for this section.
    pub fn descriptor(&self) -> EndpointDescriptor {
        let mut descriptor = EndpointDescriptor::new(&self.host, self.port)
            .with_user(&self.user)
            .with_credential(&self.password)
            .with_database(&self.database);
        if let Some(sub_host) = &self.sub_host {
            descriptor = descriptor.with_secondary_host(sub_host);
        }
        if let Some(max) = self.max_concurrency {
            descriptor = descriptor.with_max_concurrency(max);
        }
        descriptor
    }
}

/// Cache store section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheSettings {
    /// Cache host address.
    pub host: String,

    /// Cache TCP port.
    #[serde(default = "default_cache_port")]
    pub port: u16,

    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
}

impl CacheSettings {
    /// Build the cache endpoint for this section.
    pub fn endpoint(&self) -> CacheEndpoint {
        CacheEndpoint {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
        }
    }
}

/// Document store section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DocumentSettings {
    /// `host:port` origin fragments.
    #[serde(default)]
    pub origins: Vec<String>,

    /// Driver options serialized into the URL query string.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DocumentSettings {
    /// Build the document endpoint for this section.
    pub fn endpoint(&self) -> DocumentEndpoint {
        DocumentEndpoint {
            origins: self.origins.clone(),
            params: self.params.clone(),
        }
    }
}

/// Top-level broker configuration. Every section is optional; only the
/// stores present are registered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct BrokerConfig {
    /// Relational store settings.
    #[serde(default)]
    pub relational: Option<RelationalSettings>,

    /// Cache store settings.
    #[serde(default)]
    pub cache: Option<CacheSettings>,

    /// Document store settings.
    #[serde(default)]
    pub document: Option<DocumentSettings>,
}

impl BrokerConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the content does not parse.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply endpoint overrides from `lookup` (the environment in
    /// production; injectable for tests).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(relational) = &mut self.relational {
            if let Some(host) = lookup("BERTH_RELATIONAL_HOST") {
                relational.host = host;
            }
            if let Some(sub_host) = lookup("BERTH_RELATIONAL_SUB_HOST") {
                relational.sub_host = Some(sub_host);
            }
        }
        if let Some(cache) = &mut self.cache {
            if let Some(host) = lookup("BERTH_CACHE_HOST") {
                cache.host = host;
            }
        }
        if let Some(document) = &mut self.document {
            if let Some(origins) = lookup("BERTH_DOCUMENT_ORIGINS") {
                document.origins = origins
                    .split(',')
                    .map(|origin| origin.trim().to_owned())
                    .filter(|origin| !origin.is_empty())
                    .collect();
            }
        }
    }
}
