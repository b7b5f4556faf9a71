//! Hierarchical attribute documents.
//!
//! Both the initialization inputs (sub-unit and executor lists) and the
//! messages exchanged with the planner and the compute core are nested
//! key/value trees with ordered children. Keys may repeat, and list elements
//! use an empty key:
//!
//! ```text
//! (root)
//!  ├─ "" ── name = "simd0.dme"
//!  └─ "" ── name = "simd0.eu"
//! ```
//!
//! Paths are dotted (`"param.id"`); lookup follows the first child whose key
//! matches at each level.
//!
//! # Example
//!
//! ```
//! use cosim_bridge::ptree::AttrTree;
//!
//! let mut msg = AttrTree::new();
//! msg.put("destination", "simd0.dme");
//! msg.put("param.id", "p1");
//!
//! assert_eq!(msg.get("param.id"), Some("p1"));
//! assert!(msg.get("options.clique").is_none());
//! ```

use std::fmt;

/// A node of an attribute tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrTree {
    value: String,
    children: Vec<(String, AttrTree)>,
}

impl AttrTree {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a leaf node holding `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    /// Value stored at this node (empty for pure containers).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True when the node carries neither a value nor children.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.children.is_empty()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Iterate over direct children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &AttrTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Append a child, keeping any existing children with the same key.
    pub fn push_back(&mut self, key: impl Into<String>, child: AttrTree) -> &mut AttrTree {
        self.children.push((key.into(), child));
        let last = self.children.len() - 1;
        &mut self.children[last].1
    }

    /// Set the value at a dotted path, creating intermediate nodes as needed.
    pub fn put(&mut self, path: &str, value: impl Into<String>) -> &mut AttrTree {
        let node = self.child_path_mut(path);
        node.value = value.into();
        node
    }

    /// Attach a whole subtree at a dotted path, replacing what was there.
    pub fn put_child(&mut self, path: &str, child: AttrTree) -> &mut AttrTree {
        let node = self.child_path_mut(path);
        *node = child;
        node
    }

    /// Look up the subtree at a dotted path.
    pub fn get_child(&self, path: &str) -> Option<&AttrTree> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |node, key| {
            node.children
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, child)| child)
        })
    }

    /// Look up the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.get_child(path).map(|node| node.value.as_str())
    }

    /// Build a tree from a TOML value.
    ///
    /// Tables become keyed children, arrays become empty-key children and
    /// scalars become node values.
    pub fn from_toml(value: &toml::Value) -> Self {
        match value {
            toml::Value::Table(table) => {
                let mut node = AttrTree::new();
                for (key, child) in table {
                    node.push_back(key.clone(), AttrTree::from_toml(child));
                }
                node
            }
            toml::Value::Array(items) => {
                let mut node = AttrTree::new();
                for item in items {
                    node.push_back("", AttrTree::from_toml(item));
                }
                node
            }
            toml::Value::String(s) => AttrTree::with_value(s.clone()),
            other => AttrTree::with_value(other.to_string()),
        }
    }

    fn child_path_mut(&mut self, path: &str) -> &mut AttrTree {
        let mut node = self;
        for key in path.split('.').filter(|k| !k.is_empty()) {
            let idx = match node.children.iter().position(|(k, _)| k == key) {
                Some(idx) => idx,
                None => {
                    node.children.push((key.to_string(), AttrTree::new()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx].1;
        }
        node
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (key, child) in &self.children {
            let key = if key.is_empty() { "\"\"" } else { key.as_str() };
            write!(f, "{:indent$}{}", "", key, indent = depth * 2)?;
            if child.value.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, " {}", child.value)?;
            }
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Renders in the `info` layout: one key per line, children indented.
impl fmt::Display for AttrTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.value.is_empty() {
            writeln!(f, "{}", self.value)?;
        }
        self.write_indented(f, 0)
    }
}
