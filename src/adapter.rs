//! Planner <-> compute-core adapter process.
//!
//! The simulation kernel calls [`CosimAdapter::tick`] once per rising clock
//! edge. Each tick runs to completion without blocking:
//!
//! 1. Move reports that did not fit last time into `plan_out`.
//! 2. Release: take one hardware event (only if no reports are waiting)
//!    and queue the reports it makes due.
//! 3. Bind: take dispatches from `plan_in`; configuration dispatches are
//!    drained, and binding stops after the first tracked one.
//! 4. Take one status word from `busr_in` (currently unused).
//! 5. Publish job-tag trace signals that changed.
//!
//! Completions are therefore always handled before new jobs are bound in
//! the same tick.

use std::collections::VecDeque;

use crate::channel::BoundedFifo;
use crate::completion::{
    CompletionEngine, CompletionReport, CosimError, Dispatch, DispatchOutcome, HwEvent, PLANNER,
};
use crate::config::Config;
use crate::observe::{Direction, NullObserver, Observer};
use crate::ptree::AttrTree;

/// Depth of the bus status/write channels.
const BUS_DEPTH: usize = 16;

/// Adapter between the planner and one compute core.
pub struct CosimAdapter<O: Observer = NullObserver> {
    name: String,
    engine: CompletionEngine,

    /// Dispatches from the planner.
    pub plan_in: BoundedFifo<AttrTree>,
    /// Completion reports to the planner.
    pub plan_out: BoundedFifo<AttrTree>,
    /// Completion events from the compute core.
    pub event_in: BoundedFifo<AttrTree>,
    /// Status words from the compute core bus.
    pub busr_in: BoundedFifo<AttrTree>,
    /// Bus writes to the compute core. Configuration dispatches do not
    /// generate bus traffic yet, so nothing is written here.
    pub busw_out: BoundedFifo<AttrTree>,

    /// Reports that did not fit into `plan_out`, oldest first.
    backlog: VecDeque<AttrTree>,

    observer: O,
    dump: bool,
    /// Signal name and last published value, in event registration order.
    trace: Option<Vec<(String, u64)>>,
    cycle: u64,
}

impl CosimAdapter<NullObserver> {
    /// Create an adapter without observability sinks.
    pub fn new(config: &Config) -> Result<Self, CosimError> {
        Self::with_observer(config, NullObserver)
    }
}

impl<O: Observer> CosimAdapter<O> {
    /// Create an adapter reporting traces and dumps to `observer`.
    ///
    /// Checks channel depths and runs the resource registry; any
    /// configuration error aborts here.
    pub fn with_observer(config: &Config, observer: O) -> Result<Self, CosimError> {
        config.check_depths()?;
        let name = config.adapter_name()?.to_string();
        let core = config.core_name()?;
        let engine = CompletionEngine::from_trees(
            &name,
            &core,
            &config.executor_tree(),
            &config.subunit_tree(),
        )?;

        let trace = config.trace_enabled().then(|| {
            let top = config.trace_top();
            engine
                .trace_values()
                .map(|(event, _)| (format!("{}.{}.{}.job_hash", top, name, event), 0))
                .collect::<Vec<_>>()
        });

        let mut adapter = Self {
            plan_in: BoundedFifo::new("plan_in", config.plan_depth()),
            plan_out: BoundedFifo::new("plan_out", config.report_depth()),
            event_in: BoundedFifo::new("event_in", config.event_depth()),
            busr_in: BoundedFifo::new("busr_in", BUS_DEPTH),
            busw_out: BoundedFifo::new("busw_out", BUS_DEPTH),
            backlog: VecDeque::new(),
            observer,
            dump: config.dump_enabled(),
            trace,
            cycle: 0,
            name,
            engine,
        };
        adapter.publish_initial_traces();

        log::info!(
            "{}: adapter for core '{}' ready, {} events tracked",
            adapter.name,
            adapter.engine.core(),
            adapter.engine.events().len()
        );
        Ok(adapter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &CompletionEngine {
        &self.engine
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Ticks executed since creation or the last reset.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Reports waiting for room in `plan_out`.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Queue a dispatch as the planner would. Hands the envelope back if
    /// `plan_in` is full.
    pub fn push_dispatch(&mut self, msg: &Dispatch) -> Result<(), AttrTree> {
        self.plan_in.push(msg.encode())
    }

    /// Queue a hardware event as the compute core would.
    pub fn push_event(&mut self, msg: &HwEvent) -> Result<(), AttrTree> {
        self.event_in.push(msg.encode())
    }

    /// Take every report currently in `plan_out`, as the planner would.
    pub fn drain_reports(&mut self) -> Result<Vec<CompletionReport>, CosimError> {
        let envelopes: Vec<_> = self.plan_out.drain().collect();
        envelopes
            .iter()
            .map(|env| CompletionReport::decode(PLANNER, env).map_err(CosimError::from))
            .collect()
    }

    /// Process one rising clock edge.
    pub fn tick(&mut self) -> Result<(), CosimError> {
        self.cycle += 1;

        self.flush_backlog();

        // Release phase
        if self.backlog.is_empty() && self.event_in.num_available() != 0 {
            if let Some(envelope) = self.event_in.pop() {
                self.dump_envelope(Direction::Inbound, "event_in", &envelope);
                let msg = HwEvent::decode(&self.name, &envelope)?;
                for report in self.engine.on_event(&msg)? {
                    self.send_report(report);
                }
            }
        }

        // Bind phase
        while self.plan_in.num_available() != 0 {
            let Some(envelope) = self.plan_in.pop() else {
                break;
            };
            self.dump_envelope(Direction::Inbound, "plan_in", &envelope);
            let msg = Dispatch::decode(&self.name, &envelope)?;
            if self.engine.on_dispatch(&msg)? == DispatchOutcome::Bound {
                break;
            }
        }

        // Status words are read to keep the channel flowing
        if self.busr_in.num_available() != 0 {
            if let Some(envelope) = self.busr_in.pop() {
                self.dump_envelope(Direction::Inbound, "busr_in", &envelope);
            }
        }

        self.publish_traces();

        if cfg!(debug_assertions) {
            self.engine.verify()?;
        }
        Ok(())
    }

    /// Run `ticks` clock edges, stopping at the first error.
    pub fn run(&mut self, ticks: u64) -> Result<(), CosimError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Synchronous reset: drop in-flight state, keep registrations.
    pub fn reset(&mut self) {
        log::debug!("{}: reset at cycle {}", self.name, self.cycle);
        self.engine.reset();
        self.plan_in.clear();
        self.plan_out.clear();
        self.event_in.clear();
        self.busr_in.clear();
        self.busw_out.clear();
        self.backlog.clear();
        self.cycle = 0;
        self.publish_traces();
    }

    fn send_report(&mut self, report: CompletionReport) {
        let envelope = report.encode();
        if !self.backlog.is_empty() {
            self.backlog.push_back(envelope);
            return;
        }
        match self.plan_out.push(envelope.clone()) {
            Ok(()) => self.dump_envelope(Direction::Outbound, "plan_out", &envelope),
            Err(envelope) => {
                log::debug!("{}: plan_out full, holding report", self.name);
                self.backlog.push_back(envelope);
            }
        }
    }

    fn flush_backlog(&mut self) {
        while !self.plan_out.is_full() {
            let Some(envelope) = self.backlog.pop_front() else {
                break;
            };
            self.dump_envelope(Direction::Outbound, "plan_out", &envelope);
            if let Err(envelope) = self.plan_out.push(envelope) {
                self.backlog.push_front(envelope);
                break;
            }
        }
    }

    fn dump_envelope(&mut self, direction: Direction, port: &str, envelope: &AttrTree) {
        if self.dump {
            self.observer.dump(direction, port, envelope);
        }
    }

    fn publish_initial_traces(&mut self) {
        if let Some(signals) = &self.trace {
            for (signal, value) in signals {
                self.observer.trace(signal, *value);
            }
        }
    }

    fn publish_traces(&mut self) {
        let Some(signals) = self.trace.as_mut() else {
            return;
        };
        for ((signal, last), (_, value)) in signals.iter_mut().zip(self.engine.trace_values()) {
            if *last != value {
                *last = value;
                self.observer.trace(signal, value);
            }
        }
    }
}
