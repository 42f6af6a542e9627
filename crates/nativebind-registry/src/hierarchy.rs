//! Type hierarchy built from the interface schema.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: runtime type names
//! - Edges: `Parent` from a class to its parent class, `Implements` from a
//!   class (or interface) to an interface it implements (or requires)
//!
//! Serves as the [`ParentLookup`] for runtimes whose type system cannot be
//! queried for parents directly, such as the in-process dispatcher.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::introspect::ParentLookup;

/// Edge types in the hierarchy graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyEdge {
    /// Child class to parent class.
    Parent,
    /// Implementor to interface.
    Implements,
}

/// Parent and interface relations between runtime type names.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    graph: DiGraph<String, HierarchyEdge>,
    index: FxHashMap<String, NodeIndex>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type, returning its node. Adding a known type is a no-op.
    pub fn add_type(&mut self, type_name: &str) -> NodeIndex {
        if let Some(&node) = self.index.get(type_name) {
            return node;
        }
        let node = self.graph.add_node(type_name.to_string());
        self.index.insert(type_name.to_string(), node);
        node
    }

    /// Record `parent` as the parent class of `child`, replacing any earlier parent.
    pub fn set_parent(&mut self, child: &str, parent: &str) {
        let child = self.add_type(child);
        let parent = self.add_type(parent);
        // Edge removal reorders indices, so look the edge up again each time.
        while let Some(edge) = self
            .graph
            .edges(child)
            .find(|e| *e.weight() == HierarchyEdge::Parent)
            .map(|e| e.id())
        {
            self.graph.remove_edge(edge);
        }
        self.graph.add_edge(child, parent, HierarchyEdge::Parent);
    }

    /// Record that `implementor` implements (or requires) `interface`.
    pub fn add_interface(&mut self, implementor: &str, interface: &str) {
        let from = self.add_type(implementor);
        let to = self.add_type(interface);
        let exists = self
            .graph
            .edges(from)
            .any(|e| e.target() == to && *e.weight() == HierarchyEdge::Implements);
        if !exists {
            self.graph.add_edge(from, to, HierarchyEdge::Implements);
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.index.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct parent class.
    pub fn parent(&self, type_name: &str) -> Option<&str> {
        let node = *self.index.get(type_name)?;
        self.graph
            .edges(node)
            .find(|e| *e.weight() == HierarchyEdge::Parent)
            .map(|e| self.graph[e.target()].as_str())
    }

    /// Ancestors from the direct parent up to the root. Stops at a repeated type.
    pub fn ancestors(&self, type_name: &str) -> Vec<&str> {
        let mut chain: Vec<&str> = Vec::new();
        let mut current = self.parent(type_name);
        while let Some(name) = current {
            if name == type_name || chain.contains(&name) {
                break;
            }
            chain.push(name);
            current = self.parent(name);
        }
        chain
    }

    /// Interfaces declared directly on `type_name`.
    pub fn interfaces(&self, type_name: &str) -> Vec<&str> {
        let Some(&node) = self.index.get(type_name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .edges(node)
            .filter(|e| *e.weight() == HierarchyEdge::Implements)
            .map(|e| self.graph[e.target()].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Direct subtypes and implementors of `type_name`.
    pub fn children(&self, type_name: &str) -> Vec<&str> {
        let Some(&node) = self.index.get(type_name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| self.graph[e.source()].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Whether `type_name` is `ancestor`, derives from it, or implements it
    /// anywhere along its parent chain.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        if type_name == ancestor {
            return true;
        }
        std::iter::once(type_name)
            .chain(self.ancestors(type_name))
            .any(|t| t == ancestor || self.interfaces(t).contains(&ancestor))
    }
}

impl ParentLookup for TypeHierarchy {
    fn parent_of(&self, type_name: &str) -> Option<String> {
        self.parent(type_name).map(str::to_string)
    }
}
