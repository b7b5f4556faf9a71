//! Wire shapes of the messages crossing the adapter.
//!
//! Every message travels as an [`AttrTree`] envelope:
//!
//! | Message          | Direction          | Fields                                              |
//! |------------------|--------------------|-----------------------------------------------------|
//! | Dispatch         | planner -> adapter | `destination`, `thread`, `task`, `param.id`, `options.clique?` |
//! | Hardware event   | core -> adapter    | `source`, `event_id`                                |
//! | Completion report| adapter -> planner | `src`, `dst` (list, always `["planner"]`)           |
//!
//! A missing required field is a protocol error; nothing is defaulted.

use crate::ptree::AttrTree;

use super::error::ProtocolError;

/// Endpoint name of the planner on the routing fabric.
pub const PLANNER: &str = "planner";

fn required<'a>(
    adapter: &str,
    kind: &'static str,
    envelope: &'a AttrTree,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    envelope.get(field).ok_or_else(|| {
        log::error!("{}: incorrect {} structure, missing '{}'", adapter, kind, field);
        ProtocolError::IncorrectStructure {
            adapter: adapter.to_string(),
            kind,
            field,
        }
    })
}

/// Planner request binding a job to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub destination: String,
    pub thread: String,
    pub task: String,
    pub param_id: String,
    /// Join group; an empty `options.clique` decodes as `None`.
    pub clique: Option<String>,
}

impl Dispatch {
    const KIND: &'static str = "dispatch";

    pub fn new(destination: &str, thread: &str, task: &str, param_id: &str) -> Self {
        Self {
            destination: destination.to_string(),
            thread: thread.to_string(),
            task: task.to_string(),
            param_id: param_id.to_string(),
            clique: None,
        }
    }

    /// Set the join group.
    pub fn in_clique(mut self, clique: &str) -> Self {
        self.clique = Some(clique.to_string()).filter(|c| !c.is_empty());
        self
    }

    pub fn decode(adapter: &str, envelope: &AttrTree) -> Result<Self, ProtocolError> {
        let field = |name: &'static str| required(adapter, Self::KIND, envelope, name);
        Ok(Self {
            destination: field("destination")?.to_string(),
            thread: field("thread")?.to_string(),
            task: field("task")?.to_string(),
            param_id: field("param.id")?.to_string(),
            clique: envelope
                .get("options.clique")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    pub fn encode(&self) -> AttrTree {
        let mut envelope = AttrTree::new();
        envelope.put("destination", self.destination.as_str());
        envelope.put("thread", self.thread.as_str());
        envelope.put("task", self.task.as_str());
        envelope.put("param.id", self.param_id.as_str());
        if let Some(clique) = &self.clique {
            envelope.put("options.clique", clique.as_str());
        }
        envelope
    }
}

/// Compute-core notification that a sub-unit finished an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwEvent {
    pub source: String,
    pub event_id: String,
}

impl HwEvent {
    const KIND: &'static str = "event";

    pub fn new(source: &str, event_id: &str) -> Self {
        Self {
            source: source.to_string(),
            event_id: event_id.to_string(),
        }
    }

    /// Fully qualified event name, `<core>.<source>.<event_id>`.
    pub fn qualified_name(&self, core: &str) -> String {
        format!("{}.{}.{}", core, self.source, self.event_id)
    }

    /// Sub-unit resource name, `<core>.<source>`.
    pub fn unit_name(&self, core: &str) -> String {
        format!("{}.{}", core, self.source)
    }

    pub fn decode(adapter: &str, envelope: &AttrTree) -> Result<Self, ProtocolError> {
        Ok(Self {
            source: required(adapter, Self::KIND, envelope, "source")?.to_string(),
            event_id: required(adapter, Self::KIND, envelope, "event_id")?.to_string(),
        })
    }

    pub fn encode(&self) -> AttrTree {
        let mut envelope = AttrTree::new();
        envelope.put("source", self.source.as_str());
        envelope.put("event_id", self.event_id.as_str());
        envelope
    }
}

/// Completion notice sent back to the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub src: String,
    pub dst: Vec<String>,
}

impl CompletionReport {
    const KIND: &'static str = "report";

    /// Report addressed to the planner.
    pub fn to_planner(src: &str) -> Self {
        Self {
            src: src.to_string(),
            dst: vec![PLANNER.to_string()],
        }
    }

    pub fn decode(adapter: &str, envelope: &AttrTree) -> Result<Self, ProtocolError> {
        let src = required(adapter, Self::KIND, envelope, "src")?.to_string();
        let dst_list = envelope.get_child("dst").ok_or_else(|| {
            log::error!("{}: incorrect report structure, missing 'dst'", adapter);
            ProtocolError::IncorrectStructure {
                adapter: adapter.to_string(),
                kind: Self::KIND,
                field: "dst",
            }
        })?;
        let dst = dst_list
            .children()
            .map(|(_, node)| node.value().to_string())
            .collect();
        Ok(Self { src, dst })
    }

    pub fn encode(&self) -> AttrTree {
        let mut envelope = AttrTree::new();
        envelope.put("src", self.src.as_str());
        let mut dst = AttrTree::new();
        for endpoint in &self.dst {
            dst.push_back("", AttrTree::with_value(endpoint.as_str()));
        }
        envelope.put_child("dst", dst);
        envelope
    }
}
