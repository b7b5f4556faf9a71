//! Replay of planner and compute-core traffic from a TOML script.
//!
//! Stands in for the simulation kernel when running the adapter on its own.
//! Each `[[tick]]` entry queues its messages, runs one clock edge, then
//! `idle` further empty edges.
//!
//! # Script Format
//!
//! ```toml
//! [[tick]]
//! dispatch = [
//!     { destination = "simd0.dme", thread = "t1", task = "k1", param = { id = "p1" }, options = { clique = "grp" } },
//! ]
//!
//! [[tick]]
//! dispatch = [
//!     { destination = "simd0.eu", thread = "t1", task = "k1", param = { id = "p1" }, options = { clique = "grp" } },
//! ]
//! idle = 1
//!
//! [[tick]]
//! event = [{ source = "dme", event_id = "done" }, { source = "eu", event_id = "done" }]
//! idle = 2
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::adapter::CosimAdapter;
use crate::channel::BoundedFifo;
use crate::completion::{CompletionReport, ConfigError, CosimError};
use crate::observe::Observer;
use crate::ptree::AttrTree;

/// A replay script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub tick: Vec<TickStep>,
}

/// Messages delivered before one clock edge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TickStep {
    /// Planner dispatch envelopes.
    pub dispatch: Vec<toml::Table>,
    /// Compute-core completion envelopes.
    pub event: Vec<toml::Table>,
    /// Empty clock edges to run afterwards.
    pub idle: u64,
}

/// A report observed by the replayed planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Adapter cycle after which the report was read.
    pub cycle: u64,
    pub report: CompletionReport,
}

impl Script {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let script = Self::from_toml_str(&content)?;
        log::info!("Loaded script from {} ({} steps)", path.display(), script.tick.len());
        Ok(script)
    }

    /// Feed the script through `adapter`, reading reports after every edge.
    pub fn run<O: Observer>(
        &self,
        adapter: &mut CosimAdapter<O>,
    ) -> Result<Vec<ReplayReport>, CosimError> {
        let mut seen = Vec::new();

        for step in &self.tick {
            for table in &step.dispatch {
                let envelope = table_tree(table);
                deliver(adapter, &mut seen, envelope, |a| &mut a.plan_in)?;
            }
            for table in &step.event {
                let envelope = table_tree(table);
                deliver(adapter, &mut seen, envelope, |a| &mut a.event_in)?;
            }

            for _ in 0..=step.idle {
                edge(adapter, &mut seen)?;
            }
        }

        Ok(seen)
    }
}

fn table_tree(table: &toml::Table) -> AttrTree {
    AttrTree::from_toml(&toml::Value::Table(table.clone()))
}

/// Run one edge and collect whatever the planner can read.
fn edge<O: Observer>(
    adapter: &mut CosimAdapter<O>,
    seen: &mut Vec<ReplayReport>,
) -> Result<(), CosimError> {
    adapter.tick()?;
    let cycle = adapter.cycle();
    seen.extend(
        adapter
            .drain_reports()?
            .into_iter()
            .map(|report| ReplayReport { cycle, report }),
    );
    Ok(())
}

/// Push into an adapter channel, ticking while it is full.
fn deliver<O, F>(
    adapter: &mut CosimAdapter<O>,
    seen: &mut Vec<ReplayReport>,
    mut envelope: AttrTree,
    channel: F,
) -> Result<(), CosimError>
where
    O: Observer,
    F: Fn(&mut CosimAdapter<O>) -> &mut BoundedFifo<AttrTree>,
{
    loop {
        match channel(adapter).push(envelope) {
            Ok(()) => return Ok(()),
            Err(back) => {
                let port = channel(adapter).name().to_string();
                log::debug!("{}: {} full, advancing", adapter.name(), port);
                envelope = back;
                edge(adapter, seen)?;
            }
        }
    }
}
