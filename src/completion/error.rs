//! Error taxonomy of the completion core.
//!
//! Configuration errors abort initialization; protocol errors abort at the
//! point a bad message is received. Neither is retried.

use thiserror::Error;

/// Malformed initialization input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}: empty input tree")]
    EmptyTree(String),

    #[error("{what}: incorrect structure, unexpected key '{key}'")]
    UnstructuredTree { what: String, key: String },

    #[error("{what}: missing field '{field}'")]
    MissingField { what: String, field: String },

    #[error("{0}: empty name")]
    EmptyName(String),

    #[error("duplicate hash for '{name}' (collides with '{other}')")]
    DuplicateHash { name: String, other: String },

    #[error("incorrect adapter name '{0}': expected a '_adpt' suffix")]
    AdapterName(String),

    #[error("channel '{channel}' must have a depth of at least 1")]
    ChannelDepth { channel: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A message that does not fit the registered resources or the wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{adapter}: unresolved event name '{name}'")]
    UnresolvedEventName { adapter: String, name: String },

    #[error("{adapter}: unresolved event hash for '{name}'")]
    UnresolvedEventHash { adapter: String, name: String },

    #[error("{adapter}: incorrect {kind} message structure, missing '{field}'")]
    IncorrectStructure {
        adapter: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("{adapter}: '{event}' is still pending in clique '{bound}', cannot rebind to {requested}")]
    CliqueConflict {
        adapter: String,
        event: String,
        bound: String,
        requested: String,
    },

    #[error("{adapter}: completion for configuration resource '{name}'")]
    ConfigCompletion { adapter: String, name: String },
}

/// Broken cross-reference between the event and clique ledgers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("event '{event}' references missing clique {clique}")]
    DanglingClique { event: String, clique: String },

    #[error("event '{event}' is listed {count} times in clique '{clique}'")]
    MembershipMismatch {
        event: String,
        clique: String,
        count: usize,
    },

    #[error("clique '{clique}' lists unknown event {event}")]
    UnknownMember { clique: String, event: String },

    #[error("clique '{clique}' lists '{event}', which does not point back at it")]
    Orphaned { clique: String, event: String },

    #[error("clique '{0}' has no pending members but was not retired")]
    Unretired(String),

    #[error("clique '{name}' collides with active clique '{other}'")]
    CliqueCollision { name: String, other: String },
}

/// Any fatal condition raised by the adapter.
#[derive(Debug, Error)]
pub enum CosimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("ledger corrupted: {0}")]
    Ledger(#[from] LedgerError),
}
