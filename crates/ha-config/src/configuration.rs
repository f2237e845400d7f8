//! The loaded `configuration.yaml`

use crate::error::ConfigResult;
use crate::loader::YamlLoader;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the main configuration file in the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Top-level configuration, keyed by component domain
#[derive(Debug, Clone)]
pub struct Configuration {
    config_dir: PathBuf,
    root: Value,
}

impl Configuration {
    /// Load `configuration.yaml` from `config_dir` with tag processing
    pub fn load(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let root = YamlLoader::new(config_dir.clone())?.load_file(CONFIG_FILE)?;

        let config = Self { config_dir, root };
        info!(domains = ?config.domains(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_value(config_dir: impl Into<PathBuf>, root: Value) -> Self {
        Self {
            config_dir: config_dir.into(),
            root,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The raw section for a component domain
    pub fn component(&self, domain: &str) -> Option<&Value> {
        self.root.get(domain).filter(|v| !v.is_null())
    }

    /// The section for a domain as a list of entries
    ///
    /// A single mapping is treated as a one-item list; a missing section is
    /// an empty list.
    pub fn component_list(&self, domain: &str) -> Vec<Value> {
        match self.component(domain) {
            Some(Value::Sequence(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }

    /// All top-level domains, in file order
    pub fn domains(&self) -> Vec<String> {
        self.root
            .as_mapping()
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
