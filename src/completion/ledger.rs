//! Event and clique ledgers.
//!
//! Events are created once at registration and live as long as the adapter.
//! Cliques are created on first use and removed the moment they retire.
//! Cross-references go through keys in both directions:
//!
//! ```text
//!   EventRecord.clique ──CliqueKey──▶ CliqueRecord
//!   CliqueRecord.members ──[EventKey]──▶ EventRecord
//! ```
//!
//! so inserting or removing a record never leaves a stale pointer behind.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::error::{ConfigError, LedgerError};
use super::key::{CliqueKey, EventKey, JobTag};

/// Tracking record of one hardware resource.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Qualified resource name.
    pub name: String,
    /// Job currently bound to the resource, if any.
    pub job_tag: Option<JobTag>,
    /// Clique this event is waiting in, if any.
    pub clique: Option<CliqueKey>,
}

impl EventRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            job_tag: None,
            clique: None,
        }
    }

    /// Value exposed on the per-event trace signal (0 when idle).
    pub fn trace_value(&self) -> u64 {
        self.job_tag.map_or(0, JobTag::value)
    }
}

/// Member list of a clique; most join groups are small.
pub type Members = SmallVec<[EventKey; 4]>;

/// A join group waiting for all of its members to complete.
#[derive(Debug, Clone)]
pub struct CliqueRecord {
    /// Declared clique name.
    pub name: String,
    /// Completions still outstanding for the current round.
    pub pending: usize,
    /// Member events in dispatch order, each at most once.
    pub members: Members,
}

impl CliqueRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            pending: 0,
            members: Members::new(),
        }
    }

    /// Append `event` unless it is already a member. Returns true if appended.
    pub fn add_member(&mut self, event: EventKey) -> bool {
        if self.members.contains(&event) {
            false
        } else {
            self.members.push(event);
            true
        }
    }

    /// How many times `event` appears in the member list.
    pub fn count_of(&self, event: EventKey) -> usize {
        self.members.iter().filter(|m| **m == event).count()
    }
}

/// All events registered by one adapter, in registration order.
#[derive(Debug, Clone, Default)]
pub struct EventLedger {
    records: HashMap<EventKey, EventRecord>,
    order: Vec<EventKey>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource name.
    ///
    /// Fails when a different name already occupies the same key.
    pub fn insert(&mut self, name: &str) -> Result<EventKey, ConfigError> {
        self.insert_at(EventKey::of(name), name)
    }

    fn insert_at(&mut self, key: EventKey, name: &str) -> Result<EventKey, ConfigError> {
        if let Some(existing) = self.records.get(&key) {
            return Err(ConfigError::DuplicateHash {
                name: name.to_string(),
                other: existing.name.clone(),
            });
        }
        self.records.insert(key, EventRecord::new(name.to_string()));
        self.order.push(key);
        Ok(key)
    }

    /// Resolve a name to a registered key.
    pub fn resolve(&self, name: &str) -> Option<EventKey> {
        let key = EventKey::of(name);
        self.records.contains_key(&key).then_some(key)
    }

    pub fn get(&self, key: EventKey) -> Option<&EventRecord> {
        self.records.get(&key)
    }

    pub fn get_mut(&mut self, key: EventKey) -> Option<&mut EventRecord> {
        self.records.get_mut(&key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EventKey, &EventRecord)> {
        self.order
            .iter()
            .filter_map(move |key| self.records.get(key).map(|rec| (*key, rec)))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(_, rec)| rec.name.as_str()).collect()
    }

    /// Drop all job bindings and clique references.
    pub fn clear_bindings(&mut self) {
        for rec in self.records.values_mut() {
            rec.job_tag = None;
            rec.clique = None;
        }
    }
}

/// Active cliques.
#[derive(Debug, Clone, Default)]
pub struct CliqueLedger {
    records: HashMap<CliqueKey, CliqueRecord>,
}

impl CliqueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a clique by name, creating it if this is its first use.
    ///
    /// Returns the key and whether the record was created. Fails when a
    /// different active clique already occupies the same key.
    pub fn get_or_create(&mut self, name: &str) -> Result<(CliqueKey, bool), LedgerError> {
        self.get_or_create_at(CliqueKey::of(name), name)
    }

    fn get_or_create_at(
        &mut self,
        key: CliqueKey,
        name: &str,
    ) -> Result<(CliqueKey, bool), LedgerError> {
        match self.records.get(&key) {
            Some(existing) if existing.name != name => Err(LedgerError::CliqueCollision {
                name: name.to_string(),
                other: existing.name.clone(),
            }),
            Some(_) => Ok((key, false)),
            None => {
                self.records.insert(key, CliqueRecord::new(name.to_string()));
                Ok((key, true))
            }
        }
    }

    pub fn get(&self, key: CliqueKey) -> Option<&CliqueRecord> {
        self.records.get(&key)
    }

    pub fn get_mut(&mut self, key: CliqueKey) -> Option<&mut CliqueRecord> {
        self.records.get_mut(&key)
    }

    pub fn remove(&mut self, key: CliqueKey) -> Option<CliqueRecord> {
        self.records.remove(&key)
    }

    /// Look up an active clique by its declared name.
    pub fn find(&self, name: &str) -> Option<&CliqueRecord> {
        self.records.get(&CliqueKey::of(name))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CliqueKey, &CliqueRecord)> {
        self.records.iter().map(|(k, v)| (*k, v))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Check the cross-reference invariants between the two ledgers.
///
/// - every event's clique exists and lists the event exactly once
/// - every clique member is a registered event pointing back at the clique
/// - no clique with zero pending completions survives
pub fn verify(events: &EventLedger, cliques: &CliqueLedger) -> Result<(), LedgerError> {
    for (event_key, event) in events.iter() {
        let Some(clique_key) = event.clique else {
            continue;
        };
        let clique = cliques
            .get(clique_key)
            .ok_or_else(|| LedgerError::DanglingClique {
                event: event.name.clone(),
                clique: clique_key.to_string(),
            })?;
        let count = clique.count_of(event_key);
        if count != 1 {
            return Err(LedgerError::MembershipMismatch {
                event: event.name.clone(),
                clique: clique.name.clone(),
                count,
            });
        }
    }

    for (clique_key, clique) in cliques.iter() {
        if clique.pending == 0 {
            return Err(LedgerError::Unretired(clique.name.clone()));
        }
        for member in &clique.members {
            let event = events.get(*member).ok_or_else(|| LedgerError::UnknownMember {
                clique: clique.name.clone(),
                event: member.to_string(),
            })?;
            if event.clique != Some(clique_key) {
                return Err(LedgerError::Orphaned {
                    clique: clique.name.clone(),
                    event: event.name.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_insert_and_resolve() {
        let mut events = EventLedger::new();
        let key = events.insert("simd0.dme").unwrap();
        assert_eq!(events.resolve("simd0.dme"), Some(key));
        assert!(events.resolve("simd0.eu").is_none());
        assert_eq!(events.get(key).unwrap().trace_value(), 0);
    }

    #[test]
    fn test_event_duplicate_rejected() {
        let mut events = EventLedger::new();
        events.insert("simd0.dme").unwrap();
        let err = events.insert("simd0.dme").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateHash { .. }));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_event_distinct_names_same_key_rejected() {
        let mut events = EventLedger::new();
        let key = events.insert("simd0.dme").unwrap();
        let err = events.insert_at(key, "simd0.eu").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateHash { ref name, ref other } if name == "simd0.eu" && other == "simd0.dme"
        ));
        assert_eq!(events.names(), vec!["simd0.dme"]);
    }

    #[test]
    fn test_event_registration_order() {
        let mut events = EventLedger::new();
        for name in ["simd0.eu", "simd0.dme", "simd0.config"] {
            events.insert(name).unwrap();
        }
        assert_eq!(events.names(), vec!["simd0.eu", "simd0.dme", "simd0.config"]);
    }

    #[test]
    fn test_clique_create_on_first_use() {
        let mut cliques = CliqueLedger::new();
        let (key, created) = cliques.get_or_create("grp").unwrap();
        assert!(created);
        let (again, created) = cliques.get_or_create("grp").unwrap();
        assert!(!created);
        assert_eq!(key, again);
        assert_eq!(cliques.len(), 1);
        assert_eq!(cliques.find("grp").unwrap().pending, 0);
    }

    #[test]
    fn test_clique_distinct_names_same_key_rejected() {
        let mut cliques = CliqueLedger::new();
        let (key, _) = cliques.get_or_create("grp").unwrap();
        let err = cliques.get_or_create_at(key, "other").unwrap_err();
        assert_eq!(
            err,
            LedgerError::CliqueCollision {
                name: "other".into(),
                other: "grp".into(),
            }
        );
        assert_eq!(cliques.len(), 1);
        assert_eq!(cliques.get(key).unwrap().name, "grp");
    }

    #[test]
    fn test_clique_members_unique() {
        let mut clique = CliqueRecord::new("grp".into());
        let a = EventKey::of("a");
        assert!(clique.add_member(a));
        assert!(!clique.add_member(a));
        assert_eq!(clique.count_of(a), 1);
    }

    #[test]
    fn test_verify_consistent() {
        let mut events = EventLedger::new();
        let mut cliques = CliqueLedger::new();
        let dme = events.insert("simd0.dme").unwrap();
        let (grp, _) = cliques.get_or_create("grp").unwrap();
        let clique = cliques.get_mut(grp).unwrap();
        clique.add_member(dme);
        clique.pending = 1;
        events.get_mut(dme).unwrap().clique = Some(grp);

        assert!(verify(&events, &cliques).is_ok());
    }

    #[test]
    fn test_verify_dangling_clique() {
        let mut events = EventLedger::new();
        let cliques = CliqueLedger::new();
        let dme = events.insert("simd0.dme").unwrap();
        events.get_mut(dme).unwrap().clique = Some(CliqueKey::of("gone"));

        assert!(matches!(
            verify(&events, &cliques),
            Err(LedgerError::DanglingClique { .. })
        ));
    }

    #[test]
    fn test_verify_unretired_clique() {
        let events = EventLedger::new();
        let mut cliques = CliqueLedger::new();
        cliques.get_or_create("grp").unwrap();

        assert_eq!(
            verify(&events, &cliques),
            Err(LedgerError::Unretired("grp".into()))
        );
    }

    #[test]
    fn test_verify_orphaned_member() {
        let mut events = EventLedger::new();
        let mut cliques = CliqueLedger::new();
        let dme = events.insert("simd0.dme").unwrap();
        let (grp, _) = cliques.get_or_create("grp").unwrap();
        let clique = cliques.get_mut(grp).unwrap();
        clique.add_member(dme);
        clique.pending = 1;

        assert!(matches!(
            verify(&events, &cliques),
            Err(LedgerError::Orphaned { .. })
        ));
    }
}
