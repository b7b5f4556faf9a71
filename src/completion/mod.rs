//! Completion synchronization core.
//!
//! Decides when work dispatched by the planner is complete and reports it
//! back exactly once per job, including jobs spread over several hardware
//! sub-units that must all finish first (a *clique*).
//!
//! # Components
//!
//! - [`registry`]: qualified resource names of one compute core, and the
//!   executors of the planner that map onto them
//! - [`ledger`]: event and clique records, linked by key
//! - [`engine`]: the bind/release state machine
//! - [`codec`]: wire shapes of dispatch, hardware-event and report messages
//! - [`key`]: hash-derived identities
//! - [`error`]: configuration, protocol and ledger errors

pub mod codec;
pub mod engine;
pub mod error;
pub mod key;
pub mod ledger;
pub mod registry;

pub use codec::{CompletionReport, Dispatch, HwEvent, PLANNER};
pub use engine::{CompletionEngine, DispatchOutcome, EngineStats};
pub use error::{ConfigError, CosimError, LedgerError, ProtocolError};
pub use key::{CliqueKey, EventKey, JobTag};
pub use ledger::{CliqueLedger, CliqueRecord, EventLedger, EventRecord};
pub use registry::{core_name_from_adapter, register, ResourceRegistry, CONFIG_UNIT};
