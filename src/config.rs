//! Configuration of one adapter instance.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`COSIM_ADAPTER`, `COSIM_CORE`, `COSIM_CHANNEL_DEPTH`)
//! 2. File given on the command line
//! 3. Project-local config file (`./cosim-bridge.toml`)
//! 4. User config file (`~/.config/cosim-bridge/config.toml`)
//! 5. Built-in defaults
//!
//! The result is passed explicitly to the adapter; nothing here is global.
//!
//! # Config File Format
//!
//! ```toml
//! # cosim-bridge.toml
//!
//! # Adapter instance; the core name is derived by dropping "_adpt"
//! adapter = "simd0_adpt"
//!
//! # Sub-units of the compute core
//! subunits = [{ name = "dme" }, { name = "eu" }]
//!
//! # Executors declared by the planner (all cores)
//! executors = [{ name = "simd0.dme" }, { name = "simd0.eu" }, { name = "simd0.config" }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::channel::DEFAULT_DEPTH;
use crate::completion::error::ConfigError;
use crate::completion::registry::core_name_from_adapter;
use crate::ptree::AttrTree;

/// Project-local config file name.
pub const LOCAL_CONFIG: &str = "cosim-bridge.toml";

/// Adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Adapter instance name, e.g. `simd0_adpt`.
    pub adapter: Option<String>,

    /// Compute-core name. Derived from `adapter` when unset.
    pub core: Option<String>,

    /// Sub-units of the compute core (`{ name = ... }` tables).
    pub subunits: Option<Vec<toml::Table>>,

    /// Planner executor list (`{ name = ... }` tables).
    pub executors: Option<Vec<toml::Table>>,

    /// Depth of the planner -> adapter channel.
    pub plan_depth: Option<usize>,

    /// Depth of the compute core -> adapter event channel.
    pub event_depth: Option<usize>,

    /// Depth of the adapter -> planner report channel.
    pub report_depth: Option<usize>,

    /// Copy every envelope to the message dump.
    pub dump: Option<bool>,

    /// Emit per-event job tag trace signals.
    pub trace: Option<bool>,

    /// Top-level prefix of trace signal names.
    pub trace_top: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// `explicit` must exist and parse; the user and project files are
    /// optional and only warned about when broken.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_optional(Path::new(LOCAL_CONFIG)) {
            config.merge(local_config);
        }

        if let Some(path) = explicit {
            config.merge(Self::from_file(path)?);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file that must exist.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            log::error!("Failed to read {}: {}", path.display(), e);
            ConfigError::Io(e)
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            log::error!("Failed to parse {}: {}", path.display(), e);
            e
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Adapter instance name.
    pub fn adapter_name(&self) -> Result<&str, ConfigError> {
        self.adapter.as_deref().ok_or_else(|| ConfigError::MissingField {
            what: "config".to_string(),
            field: "adapter".to_string(),
        })
    }

    /// Compute-core name: `core` if set, otherwise derived from `adapter`.
    pub fn core_name(&self) -> Result<String, ConfigError> {
        if let Some(core) = &self.core {
            return Ok(core.clone());
        }
        Ok(core_name_from_adapter(self.adapter_name()?)?.to_string())
    }

    /// Sub-unit list as an attribute tree for the resource registry.
    pub fn subunit_tree(&self) -> AttrTree {
        table_list_tree(self.subunits.as_deref())
    }

    /// Executor list as an attribute tree for the resource registry.
    pub fn executor_tree(&self) -> AttrTree {
        table_list_tree(self.executors.as_deref())
    }

    pub fn plan_depth(&self) -> usize {
        self.plan_depth.unwrap_or(DEFAULT_DEPTH)
    }

    pub fn event_depth(&self) -> usize {
        self.event_depth.unwrap_or(DEFAULT_DEPTH)
    }

    pub fn report_depth(&self) -> usize {
        self.report_depth.unwrap_or(DEFAULT_DEPTH)
    }

    /// Reject channel depths the adapter cannot run with.
    ///
    /// A zero-depth channel never accepts a message, so reports or
    /// dispatches would wait forever.
    pub fn check_depths(&self) -> Result<(), ConfigError> {
        let depths = [
            ("plan_in", self.plan_depth()),
            ("event_in", self.event_depth()),
            ("plan_out", self.report_depth()),
        ];
        for (channel, depth) in depths {
            if depth == 0 {
                log::error!("Channel {} configured with depth 0", channel);
                return Err(ConfigError::ChannelDepth { channel });
            }
        }
        Ok(())
    }

    pub fn dump_enabled(&self) -> bool {
        self.dump.unwrap_or(false)
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace.unwrap_or(false)
    }

    /// Top-level prefix of trace signal names, with fallback to `"top"`.
    pub fn trace_top(&self) -> String {
        self.trace_top.clone().unwrap_or_else(|| "top".to_string())
    }

    /// Load user configuration from ~/.config/cosim-bridge/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_optional(&config_path)
    }

    /// Load an optional configuration file, warning if it is broken.
    fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.adapter.is_some() {
            self.adapter = other.adapter;
        }
        if other.core.is_some() {
            self.core = other.core;
        }
        if other.subunits.is_some() {
            self.subunits = other.subunits;
        }
        if other.executors.is_some() {
            self.executors = other.executors;
        }
        if other.plan_depth.is_some() {
            self.plan_depth = other.plan_depth;
        }
        if other.event_depth.is_some() {
            self.event_depth = other.event_depth;
        }
        if other.report_depth.is_some() {
            self.report_depth = other.report_depth;
        }
        if other.dump.is_some() {
            self.dump = other.dump;
        }
        if other.trace.is_some() {
            self.trace = other.trace;
        }
        if other.trace_top.is_some() {
            self.trace_top = other.trace_top;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(adapter) = std::env::var("COSIM_ADAPTER") {
            log::info!("Using COSIM_ADAPTER from environment: {}", adapter);
            self.adapter = Some(adapter);
        }
        if let Ok(core) = std::env::var("COSIM_CORE") {
            log::info!("Using COSIM_CORE from environment: {}", core);
            self.core = Some(core);
        }
        if let Ok(depth) = std::env::var("COSIM_CHANNEL_DEPTH") {
            match depth.parse::<usize>() {
                Ok(depth) if depth > 0 => {
                    log::info!("Using COSIM_CHANNEL_DEPTH from environment: {}", depth);
                    self.plan_depth = Some(depth);
                    self.event_depth = Some(depth);
                    self.report_depth = Some(depth);
                }
                _ => log::warn!("Ignoring invalid COSIM_CHANNEL_DEPTH '{}'", depth),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cosim-bridge").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# cosim-bridge configuration
# Place this file at ~/.config/cosim-bridge/config.toml or ./cosim-bridge.toml

# Adapter instance name; the compute core is the part before "_adpt"
adapter = "simd0_adpt"

# Explicit core name (optional, overrides the derived one)
# core = "simd0"

# Sub-units of the compute core; "<core>.config" is always added
subunits = [{ name = "dme" }, { name = "eu" }]

# Executors declared by the planner; those of other cores are ignored
executors = [
    { name = "simd0.dme" },
    { name = "simd0.eu" },
    { name = "simd0.config" },
    { name = "simd1.dme" },
]

# Channel depths (optional, default 64)
# plan_depth = 64
# event_depth = 64
# report_depth = 64

# Observability (optional)
# dump = true
# trace = true
# trace_top = "top"
"#
        .to_string()
    }
}

/// Turn a list of TOML tables into a list tree (empty-key children).
fn table_list_tree(list: Option<&[toml::Table]>) -> AttrTree {
    let items = list
        .unwrap_or_default()
        .iter()
        .cloned()
        .map(toml::Value::Table)
        .collect();
    AttrTree::from_toml(&toml::Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.plan_depth(), 64);
        assert_eq!(config.event_depth(), 64);
        assert_eq!(config.report_depth(), 64);
        assert!(!config.dump_enabled());
        assert_eq!(config.trace_top(), "top");
        assert!(config.adapter_name().is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            adapter: Some("simd0_adpt".to_string()),
            plan_depth: Some(8),
            ..Default::default()
        };

        let overlay = Config {
            core: Some("simd9".to_string()),
            plan_depth: Some(16),
            ..Default::default()
        };

        base.merge(overlay);

        // adapter unchanged (overlay was None)
        assert_eq!(base.adapter.as_deref(), Some("simd0_adpt"));
        // core set from overlay
        assert_eq!(base.core.as_deref(), Some("simd9"));
        // plan_depth overridden by overlay
        assert_eq!(base.plan_depth(), 16);
    }

    #[test]
    fn test_check_depths() {
        assert!(Config::default().check_depths().is_ok());

        let config = Config {
            report_depth: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.check_depths(),
            Err(ConfigError::ChannelDepth { channel: "plan_out" })
        ));
    }

    #[test]
    fn test_core_name() {
        let mut config = Config {
            adapter: Some("simd0_adpt".to_string()),
            ..Default::default()
        };
        assert_eq!(config.core_name().unwrap(), "simd0");

        config.core = Some("custom".to_string());
        assert_eq!(config.core_name().unwrap(), "custom");

        config.core = None;
        config.adapter = Some("simd0".to_string());
        assert!(matches!(config.core_name(), Err(ConfigError::AdapterName(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_toml_str(&Config::sample_config())
            .expect("Sample config should parse");
        assert_eq!(config.core_name().unwrap(), "simd0");

        let units = config.subunit_tree();
        let names: Vec<_> = units.children().map(|(_, u)| u.get("name").unwrap()).collect();
        assert_eq!(names, vec!["dme", "eu"]);
        assert_eq!(config.executor_tree().len(), 4);
    }

    #[test]
    fn test_missing_lists_are_empty_trees() {
        let config = Config::default();
        assert_eq!(config.subunit_tree().len(), 0);
        assert_eq!(config.executor_tree().len(), 0);
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(matches!(
            Config::from_toml_str("adapter = ["),
            Err(ConfigError::Toml(_))
        ));
    }
}
