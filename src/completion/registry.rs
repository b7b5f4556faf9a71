//! Resource registry: which executors belong to this compute core.
//!
//! A compute core named `simd0` with sub-units `dme` and `eu` owns the
//! qualified resources
//!
//! ```text
//! simd0.dme   simd0.eu   simd0.config
//! ```
//!
//! where `.config` is the synthetic configuration-only resource. The planner
//! declares executors for every core in the system; an executor belongs to
//! this core when its name is one of those resources or extends one with a
//! further `.`-separated segment (`simd0.dme.done`). Everything else is left
//! to the adapter of the core it names.
//!
//! # Usage
//!
//! ```
//! use cosim_bridge::completion::ResourceRegistry;
//! use cosim_bridge::ptree::AttrTree;
//!
//! let mut units = AttrTree::new();
//! units.push_back("", AttrTree::new()).put("name", "dme");
//!
//! let mut execs = AttrTree::new();
//! execs.push_back("", AttrTree::new()).put("name", "simd0.dme");
//! execs.push_back("", AttrTree::new()).put("name", "simd1.dme");
//!
//! let registry = ResourceRegistry::new("simd0", &units).unwrap();
//! let ledger = registry.register(&execs).unwrap();
//! assert_eq!(ledger.names(), vec!["simd0.dme"]);
//! ```

use crate::ptree::AttrTree;

use super::error::ConfigError;
use super::ledger::EventLedger;

/// Sub-unit name of the synthetic configuration resource.
pub const CONFIG_UNIT: &str = "config";

/// Suffix that adapter instance names carry after the core name.
pub const ADAPTER_SUFFIX: &str = "_adpt";

/// Derive the compute-core name from an adapter instance name.
///
/// `simd0_adpt` serves core `simd0`.
pub fn core_name_from_adapter(adapter: &str) -> Result<&str, ConfigError> {
    match adapter.rfind(ADAPTER_SUFFIX) {
        Some(pos) if pos > 0 => Ok(&adapter[..pos]),
        _ => Err(ConfigError::AdapterName(adapter.to_string())),
    }
}

/// Qualified resource names of one compute core.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    core: String,
    resources: Vec<String>,
}

impl ResourceRegistry {
    /// Build the resource set from the core's sub-unit list.
    ///
    /// `subunits` is a list of empty-key children, each with a `name` field.
    /// Duplicate sub-unit names are kept as given.
    pub fn new(core: &str, subunits: &AttrTree) -> Result<Self, ConfigError> {
        let what = format!("{}: sub-unit list", core);
        let mut resources = Vec::with_capacity(subunits.len() + 1);

        for name in list_names(&what, subunits)? {
            resources.push(format!("{}.{}", core, name));
        }
        resources.push(format!("{}.{}", core, CONFIG_UNIT));

        log::debug!("{}: resources {:?}", core, resources);

        Ok(Self {
            core: core.to_string(),
            resources,
        })
    }

    /// Compute-core name.
    pub fn core(&self) -> &str {
        &self.core
    }

    /// Qualified resource names, sub-units first, `.config` last.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Qualified name of the configuration resource.
    pub fn config_resource(&self) -> &str {
        // Always pushed last by `new`
        &self.resources[self.resources.len() - 1]
    }

    /// True when `name` addresses the configuration resource.
    pub fn is_config(&self, name: &str) -> bool {
        segment_prefix(self.config_resource(), name)
    }

    /// True when `executor` belongs to one of this core's resources.
    pub fn owns(&self, executor: &str) -> bool {
        self.resources.iter().any(|res| segment_prefix(res, executor))
    }

    /// Create an event record for every executor this core owns.
    ///
    /// `executors` is the planner's full executor list (empty-key children
    /// with a `name` field). Executors of other cores are skipped; two
    /// distinct names with the same key abort registration.
    pub fn register(&self, executors: &AttrTree) -> Result<EventLedger, ConfigError> {
        let what = format!("{}: executor list", self.core);
        let mut ledger = EventLedger::new();
        let mut skipped = 0usize;

        for name in list_names(&what, executors)? {
            if !self.owns(name) {
                skipped += 1;
                continue;
            }
            if let Err(e) = ledger.insert(name) {
                log::error!("{}: {}", self.core, e);
                return Err(e);
            }
        }

        log::info!(
            "{}: registered {} events ({} executors belong to other cores)",
            self.core,
            ledger.len(),
            skipped
        );
        Ok(ledger)
    }
}

/// Build the registry and register the executors in one step.
pub fn register(
    core: &str,
    executors: &AttrTree,
    subunits: &AttrTree,
) -> Result<(ResourceRegistry, EventLedger), ConfigError> {
    let registry = ResourceRegistry::new(core, subunits)?;
    let ledger = registry.register(executors)?;
    Ok((registry, ledger))
}

/// True when `name` is `prefix` or continues it with a `.` segment.
fn segment_prefix(prefix: &str, name: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Extract the `name` field of every element of a list tree.
fn list_names<'a>(what: &str, list: &'a AttrTree) -> Result<Vec<&'a str>, ConfigError> {
    if list.children().next().is_none() {
        log::error!("{}: empty input tree", what);
        return Err(ConfigError::EmptyTree(what.to_string()));
    }

    let mut names = Vec::with_capacity(list.len());
    for (key, element) in list.children() {
        if !key.is_empty() {
            log::error!("{}: unexpected key '{}'", what, key);
            return Err(ConfigError::UnstructuredTree {
                what: what.to_string(),
                key: key.to_string(),
            });
        }
        let name = element.get("name").ok_or_else(|| {
            log::error!("{}: element without a name", what);
            ConfigError::MissingField {
                what: what.to_string(),
                field: "name".to_string(),
            }
        })?;
        if name.is_empty() {
            log::error!("{}: empty name", what);
            return Err(ConfigError::EmptyName(what.to_string()));
        }
        names.push(name);
    }
    Ok(names)
}
