//! Completion engine.
//!
//! Binds dispatched jobs to events and turns hardware completions into
//! reports for the planner, one report per dispatched job:
//!
//! ```text
//!   Dispatch ──▶ on_dispatch ──▶ EventRecord.job_tag / clique membership
//!   HwEvent  ──▶ on_event    ──▶ solo report, or
//!                                clique.pending -= 1 ──(0)──▶ one report per
//!                                member, in dispatch order; clique removed
//! ```
//!
//! A clique whose pending count reaches zero is retired within the same
//! call, so no zero-pending clique is ever visible from outside.
//!
//! # Usage
//!
//! ```
//! use cosim_bridge::completion::{CompletionEngine, Dispatch, HwEvent};
//! use cosim_bridge::ptree::AttrTree;
//!
//! let mut units = AttrTree::new();
//! let mut execs = AttrTree::new();
//! for unit in ["dme", "eu"] {
//!     units.push_back("", AttrTree::new()).put("name", unit);
//!     execs.push_back("", AttrTree::new()).put("name", format!("simd0.{unit}"));
//! }
//!
//! let mut engine = CompletionEngine::from_trees("simd0_adpt", "simd0", &execs, &units).unwrap();
//! engine.on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p1").in_clique("grp")).unwrap();
//! engine.on_dispatch(&Dispatch::new("simd0.eu", "t1", "k1", "p1").in_clique("grp")).unwrap();
//!
//! assert!(engine.on_event(&HwEvent::new("dme", "done")).unwrap().is_empty());
//! let reports = engine.on_event(&HwEvent::new("eu", "done")).unwrap();
//! assert_eq!(reports.len(), 2);
//! assert_eq!(reports[0].src, "simd0.dme");
//! ```

use super::codec::{CompletionReport, Dispatch, HwEvent};
use super::error::{ConfigError, CosimError, LedgerError, ProtocolError};
use super::key::{CliqueKey, EventKey, JobTag};
use super::ledger::{self, CliqueLedger, CliqueRecord, EventLedger, EventRecord};
use super::registry::ResourceRegistry;
use crate::ptree::AttrTree;

/// Counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Dispatches bound to a tracked (non-config) event
    pub dispatches_bound: u64,
    /// Dispatches to the configuration resource
    pub config_consumed: u64,
    /// Hardware completions received
    pub events_consumed: u64,
    /// Reports produced for the planner
    pub reports_emitted: u64,
    pub cliques_created: u64,
    pub cliques_retired: u64,
}

/// How a dispatch was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Job bound to a tracked event; a completion will follow.
    Bound,
    /// Configuration traffic; fully consumed, never reported.
    Config,
}

/// Event/clique state machine of one adapter.
#[derive(Debug)]
pub struct CompletionEngine {
    adapter: String,
    registry: ResourceRegistry,
    events: EventLedger,
    cliques: CliqueLedger,
    stats: EngineStats,
}

impl CompletionEngine {
    /// Create an engine over an already registered event ledger.
    pub fn new(adapter: &str, registry: ResourceRegistry, events: EventLedger) -> Self {
        Self {
            adapter: adapter.to_string(),
            registry,
            events,
            cliques: CliqueLedger::new(),
            stats: EngineStats::default(),
        }
    }

    /// Run the resource registry over the initialization trees.
    pub fn from_trees(
        adapter: &str,
        core: &str,
        executors: &AttrTree,
        subunits: &AttrTree,
    ) -> Result<Self, ConfigError> {
        let registry = ResourceRegistry::new(core, subunits)?;
        let events = registry.register(executors)?;
        Ok(Self::new(adapter, registry, events))
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn core(&self) -> &str {
        self.registry.core()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventLedger {
        &self.events
    }

    pub fn cliques(&self) -> &CliqueLedger {
        &self.cliques
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Look up an event record by its registered name.
    pub fn event(&self, name: &str) -> Option<&EventRecord> {
        self.events.resolve(name).and_then(|key| self.events.get(key))
    }

    /// Look up an active clique by name.
    pub fn clique(&self, name: &str) -> Option<&CliqueRecord> {
        self.cliques.find(name)
    }

    /// Bind a dispatched job to its destination event.
    pub fn on_dispatch(&mut self, msg: &Dispatch) -> Result<DispatchOutcome, CosimError> {
        let key = EventKey::of(&msg.destination);
        let Some(event) = self.events.get_mut(key) else {
            log::error!("{}: unresolved event name '{}'", self.adapter, msg.destination);
            return Err(ProtocolError::UnresolvedEventName {
                adapter: self.adapter.clone(),
                name: msg.destination.clone(),
            }
            .into());
        };

        // Configuration traffic is consumed without binding anything
        if self.registry.is_config(&msg.destination) {
            match &msg.clique {
                Some(clique) => log::debug!(
                    "{}: config dispatch to '{}' consumed, clique '{}' ignored",
                    self.adapter,
                    msg.destination,
                    clique
                ),
                None => log::debug!(
                    "{}: config dispatch to '{}' consumed",
                    self.adapter,
                    msg.destination
                ),
            }
            self.stats.config_consumed += 1;
            return Ok(DispatchOutcome::Config);
        }
        let requested = msg.clique.as_deref();

        // An event may wait in at most one clique at a time
        if let Some(bound) = event.clique {
            let same = requested
                .is_some_and(|name| self.cliques.get(bound).is_some_and(|c| c.name == name));
            if !same {
                let bound_name = self
                    .cliques
                    .get(bound)
                    .map_or_else(|| bound.to_string(), |c| c.name.clone());
                let requested = requested.map_or_else(
                    || "no clique".to_string(),
                    |name| format!("clique '{}'", name),
                );
                log::error!(
                    "{}: '{}' still pending in clique '{}', rebind to {} refused",
                    self.adapter,
                    event.name,
                    bound_name,
                    requested
                );
                return Err(ProtocolError::CliqueConflict {
                    adapter: self.adapter.clone(),
                    event: event.name.clone(),
                    bound: bound_name,
                    requested,
                }
                .into());
            }
        }

        let tag = JobTag::new(&msg.thread, &msg.task, &msg.param_id);

        match requested {
            Some(name) => {
                let (clique_key, created) = self.cliques.get_or_create(name).map_err(|e| {
                    log::error!("{}: {}", self.adapter, e);
                    e
                })?;
                event.job_tag = Some(tag);
                if created {
                    self.stats.cliques_created += 1;
                }
                let Some(clique) = self.cliques.get_mut(clique_key) else {
                    return Err(LedgerError::DanglingClique {
                        event: event.name.clone(),
                        clique: name.to_string(),
                    }
                    .into());
                };
                clique.add_member(key);
                clique.pending += 1;
                event.clique = Some(clique_key);
                log::debug!(
                    "{}: bound {} to '{}' in clique '{}' (pending {})",
                    self.adapter,
                    tag,
                    event.name,
                    clique.name,
                    clique.pending
                );
            }
            None => {
                event.job_tag = Some(tag);
                event.clique = None;
                log::debug!("{}: bound {} to '{}'", self.adapter, tag, event.name);
            }
        }

        self.stats.dispatches_bound += 1;
        Ok(DispatchOutcome::Bound)
    }

    /// Resolve a hardware completion to its event.
    ///
    /// Tries the per-event name `<core>.<source>.<event_id>` first, then the
    /// sub-unit name `<core>.<source>`.
    pub fn resolve_completion(&self, msg: &HwEvent) -> Result<EventKey, ProtocolError> {
        let qualified = msg.qualified_name(self.core());
        if let Some(key) = self.events.resolve(&qualified) {
            return Ok(key);
        }
        if let Some(key) = self.events.resolve(&msg.unit_name(self.core())) {
            return Ok(key);
        }
        log::error!("{}: unresolved event hash for '{}'", self.adapter, qualified);
        Err(ProtocolError::UnresolvedEventHash {
            adapter: self.adapter.clone(),
            name: qualified,
        })
    }

    /// Account for one hardware completion.
    ///
    /// Returns the reports that became due: one for a solo event, none while
    /// clique siblings are outstanding, or one per member when the clique
    /// retires.
    pub fn on_event(&mut self, msg: &HwEvent) -> Result<Vec<CompletionReport>, CosimError> {
        self.stats.events_consumed += 1;
        let key = self.resolve_completion(msg)?;
        let Some(event) = self.events.get_mut(key) else {
            return Err(ProtocolError::UnresolvedEventHash {
                adapter: self.adapter.clone(),
                name: msg.qualified_name(self.registry.core()),
            }
            .into());
        };

        if self.registry.is_config(&event.name) {
            log::error!(
                "{}: completion for configuration resource '{}'",
                self.adapter,
                event.name
            );
            return Err(ProtocolError::ConfigCompletion {
                adapter: self.adapter.clone(),
                name: event.name.clone(),
            }
            .into());
        }

        let Some(clique_key) = event.clique else {
            if event.job_tag.is_none() {
                log::warn!(
                    "{}: completion for idle event '{}'",
                    self.adapter,
                    event.name
                );
            }
            event.job_tag = None;
            log::debug!("{}: '{}' completed", self.adapter, event.name);
            self.stats.reports_emitted += 1;
            return Ok(vec![CompletionReport::to_planner(&event.name)]);
        };

        let Some(clique) = self.cliques.get_mut(clique_key) else {
            log::error!(
                "{}: '{}' references missing clique {}",
                self.adapter,
                event.name,
                clique_key
            );
            return Err(LedgerError::DanglingClique {
                event: event.name.clone(),
                clique: clique_key.to_string(),
            }
            .into());
        };

        if clique.pending == 0 {
            return Err(LedgerError::Unretired(clique.name.clone()).into());
        }
        clique.pending -= 1;
        if clique.pending > 0 {
            log::debug!(
                "{}: '{}' completed, clique '{}' waits for {} more",
                self.adapter,
                event.name,
                clique.name,
                clique.pending
            );
            return Ok(Vec::new());
        }

        let reports = self.retire(clique_key)?;
        self.stats.reports_emitted += reports.len() as u64;
        Ok(reports)
    }

    /// Remove a finished clique and report every member in dispatch order.
    fn retire(&mut self, clique_key: CliqueKey) -> Result<Vec<CompletionReport>, CosimError> {
        let Some(clique) = self.cliques.remove(clique_key) else {
            return Ok(Vec::new());
        };

        let mut reports = Vec::with_capacity(clique.members.len());
        for member in &clique.members {
            let Some(event) = self.events.get_mut(*member) else {
                return Err(LedgerError::UnknownMember {
                    clique: clique.name.clone(),
                    event: member.to_string(),
                }
                .into());
            };
            event.job_tag = None;
            event.clique = None;
            reports.push(CompletionReport::to_planner(&event.name));
        }

        self.stats.cliques_retired += 1;
        log::info!(
            "{}: clique '{}' retired with {} members",
            self.adapter,
            clique.name,
            reports.len()
        );
        Ok(reports)
    }

    /// Check the ledger cross-references.
    pub fn verify(&self) -> Result<(), LedgerError> {
        ledger::verify(&self.events, &self.cliques)
    }

    /// `(name, job tag)` of every event, in registration order; 0 when idle.
    pub fn trace_values(&self) -> impl Iterator<Item = (&str, u64)> {
        self.events
            .iter()
            .map(|(_, rec)| (rec.name.as_str(), rec.trace_value()))
    }

    /// Drop every binding and clique; registrations are kept.
    pub fn reset(&mut self) {
        self.events.clear_bindings();
        self.cliques.clear();
        self.stats = EngineStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_list(names: &[&str]) -> AttrTree {
        let mut list = AttrTree::new();
        for name in names {
            list.push_back("", AttrTree::new()).put("name", *name);
        }
        list
    }

    fn simd0() -> CompletionEngine {
        CompletionEngine::from_trees(
            "simd0_adpt",
            "simd0",
            &name_list(&["simd0.dme", "simd0.eu", "simd0.config", "simd1.dme"]),
            &name_list(&["dme", "eu"]),
        )
        .unwrap()
    }

    fn srcs(reports: &[CompletionReport]) -> Vec<&str> {
        reports.iter().map(|r| r.src.as_str()).collect()
    }

    #[test]
    fn test_solo_round_trip() {
        let mut engine = simd0();
        let outcome = engine
            .on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p1"))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Bound);
        assert!(engine.event("simd0.dme").unwrap().job_tag.is_some());

        let reports = engine.on_event(&HwEvent::new("dme", "done")).unwrap();
        assert_eq!(reports, vec![CompletionReport::to_planner("simd0.dme")]);
        assert_eq!(reports[0].dst, vec!["planner".to_string()]);
        assert!(engine.event("simd0.dme").unwrap().job_tag.is_none());
        assert!(engine.verify().is_ok());
    }

    #[test]
    fn test_clique_join_in_dispatch_order() {
        let mut engine = simd0();
        engine
            .on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p1").in_clique("grp"))
            .unwrap();
        engine
            .on_dispatch(&Dispatch::new("simd0.eu", "t1", "k1", "p1").in_clique("grp"))
            .unwrap();
        assert_eq!(engine.clique("grp").unwrap().pending, 2);

        // Completions arrive in the reverse order; reports keep dispatch order
        assert!(engine.on_event(&HwEvent::new("eu", "done")).unwrap().is_empty());
        assert!(engine.verify().is_ok());
        let reports = engine.on_event(&HwEvent::new("dme", "done")).unwrap();

        assert_eq!(srcs(&reports), vec!["simd0.dme", "simd0.eu"]);
        assert!(engine.clique("grp").is_none());
        assert!(engine.cliques().is_empty());
        for name in ["simd0.dme", "simd0.eu"] {
            let event = engine.event(name).unwrap();
            assert!(event.job_tag.is_none());
            assert!(event.clique.is_none());
        }
        assert_eq!(engine.stats().cliques_retired, 1);
        assert!(engine.verify().is_ok());
    }

    #[test]
    fn test_clique_retired_name_starts_fresh() {
        let mut engine = simd0();
        for dest in ["simd0.dme", "simd0.eu"] {
            engine
                .on_dispatch(&Dispatch::new(dest, "t1", "k1", "p1").in_clique("grp"))
                .unwrap();
        }
        engine.on_event(&HwEvent::new("dme", "done")).unwrap();
        engine.on_event(&HwEvent::new("eu", "done")).unwrap();
        assert!(engine.clique("grp").is_none());

        engine
            .on_dispatch(&Dispatch::new("simd0.eu", "t2", "k2", "p2").in_clique("grp"))
            .unwrap();
        let clique = engine.clique("grp").unwrap();
        assert_eq!(clique.pending, 1);
        assert_eq!(clique.members.len(), 1);
        assert_eq!(engine.stats().cliques_created, 2);

        let reports = engine.on_event(&HwEvent::new("eu", "done")).unwrap();
        assert_eq!(srcs(&reports), vec!["simd0.eu"]);
    }

    #[test]
    fn test_same_clique_rebind_counts_twice() {
        let mut engine = simd0();
        let msg = Dispatch::new("simd0.dme", "t1", "k1", "p1").in_clique("grp");
        engine.on_dispatch(&msg).unwrap();
        engine.on_dispatch(&msg).unwrap();

        let clique = engine.clique("grp").unwrap();
        assert_eq!(clique.pending, 2);
        assert_eq!(clique.members.len(), 1);

        assert!(engine.on_event(&HwEvent::new("dme", "done")).unwrap().is_empty());
        let reports = engine.on_event(&HwEvent::new("dme", "done")).unwrap();
        assert_eq!(srcs(&reports), vec!["simd0.dme"]);
    }

    #[test]
    fn test_rebind_to_other_clique_refused() {
        let mut engine = simd0();
        engine
            .on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p1").in_clique("a"))
            .unwrap();

        let err = engine
            .on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p2").in_clique("b"))
            .unwrap_err();
        assert!(matches!(
            err,
            CosimError::Protocol(ProtocolError::CliqueConflict { ref bound, .. }) if bound == "a"
        ));

        let err = engine
            .on_dispatch(&Dispatch::new("simd0.dme", "t1", "k1", "p3"))
            .unwrap_err();
        assert!(matches!(
            err,
            CosimError::Protocol(ProtocolError::CliqueConflict { .. })
        ));
        assert!(engine.verify().is_ok());
    }

    #[test]
    fn test_config_dispatch_never_reports() {
        let mut engine = simd0();
        let outcome = engine
            .on_dispatch(&Dispatch::new("simd0.config", "t1", "cfg", "p0").in_clique("grp"))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Config);
        assert!(engine.clique("grp").is_none());
        assert!(engine.event("simd0.config").unwrap().clique.is_none());
        assert_eq!(engine.stats().config_consumed, 1);
        assert_eq!(engine.stats().reports_emitted, 0);
    }

    #[test]
    fn test_config_dispatch_leaves_event_idle() {
        let mut engine = simd0();
        engine
            .on_dispatch(&Dispatch::new("simd0.config", "t1", "cfg", "p0"))
            .unwrap();
        assert!(engine.event("simd0.config").unwrap().job_tag.is_none());
        assert!(engine.trace_values().all(|(_, v)| v == 0));
        assert_eq!(engine.stats().dispatches_bound, 0);
    }

    #[test]
    fn test_config_completion_rejected() {
        let mut engine = simd0();
        engine
            .on_dispatch(&Dispatch::new("simd0.config", "t1", "cfg", "p0"))
            .unwrap();

        let err = engine.on_event(&HwEvent::new("config", "done")).unwrap_err();
        assert!(matches!(
            err,
            CosimError::Protocol(ProtocolError::ConfigCompletion { ref name, .. }) if name == "simd0.config"
        ));
        assert_eq!(engine.stats().reports_emitted, 0);
    }

    #[test]
    fn test_unresolved_dispatch_fatal() {
        let mut engine = simd0();
        let err = engine
            .on_dispatch(&Dispatch::new("simd1.dme", "t1", "k1", "p1"))
            .unwrap_err();
        assert!(matches!(
            err,
            CosimError::Protocol(ProtocolError::UnresolvedEventName { ref name, .. }) if name == "simd1.dme"
        ));
    }

    #[test]
    fn test_unresolved_event_fatal() {
        let mut engine = simd0();
        let err = engine.on_event(&HwEvent::new("vpu", "done")).unwrap_err();
        assert!(matches!(
            err,
            CosimError::Protocol(ProtocolError::UnresolvedEventHash { ref name, .. }) if name == "simd0.vpu.done"
        ));
    }

    #[test]
    fn test_per_event_executor_resolution() {
        let mut engine = CompletionEngine::from_trees(
            "simd0_adpt",
            "simd0",
            &name_list(&["simd0.dme.done", "simd0.dme"]),
            &name_list(&["dme"]),
        )
        .unwrap();

        engine
            .on_dispatch(&Dispatch::new("simd0.dme.done", "t1", "k1", "p1"))
            .unwrap();
        let reports = engine.on_event(&HwEvent::new("dme", "done")).unwrap();
        assert_eq!(srcs(&reports), vec!["simd0.dme.done"]);
    }

    #[test]
    fn test_idle_completion_still_reports() {
        let mut engine = simd0();
        let reports = engine.on_event(&HwEvent::new("eu", "done")).unwrap();
        assert_eq!(srcs(&reports), vec!["simd0.eu"]);
    }

    #[test]
    fn test_trace_values_and_reset() {
        let mut engine = simd0();
        engine
            .on_dispatch(&Dispatch::new("simd0.eu", "t1", "k1", "p1").in_clique("grp"))
            .unwrap();

        let traced: Vec<_> = engine.trace_values().collect();
        assert_eq!(traced.len(), 3);
        assert_eq!(traced[0], ("simd0.dme", 0));
        assert_eq!(traced[1].1, JobTag::new("t1", "k1", "p1").value());

        engine.reset();
        assert!(engine.cliques().is_empty());
        assert!(engine.trace_values().all(|(_, v)| v == 0));
        assert_eq!(engine.events().len(), 3);
        assert_eq!(*engine.stats(), EngineStats::default());
    }
}
