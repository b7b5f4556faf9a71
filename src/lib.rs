//! cosim-bridge library
//!
//! Completion synchronization between a task planner and a compute-core
//! model in a co-simulation.

pub mod adapter;
pub mod channel;
pub mod completion;
pub mod config;
pub mod observe;
pub mod ptree;
pub mod script;

pub use adapter::CosimAdapter;
pub use config::Config;
