//! YAML configuration loading
//!
//! `configuration.yaml` is read from the config directory with support for
//! a few custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution (`!env_var VAR default`
//!   falls back to `default` when unset)
//!
//! # Example
//!
//! ```ignore
//! use ha_config::Configuration;
//!
//! let config = Configuration::load("/config")?;
//! for item in config.component_list("garage_switch") {
//!     // hand each entry to the component
//! }
//! ```

mod configuration;
mod error;
mod loader;
mod secrets;

pub use configuration::{Configuration, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;
