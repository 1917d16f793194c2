//! This module defines [DependencyGraph].

use std::collections::{hash_map::Entry, HashMap};

use petgraph::{graph::NodeIndex, Directed, Graph};

use crate::rule_model::rule::Rule;

/// Graph whose nodes are relation names
/// with an edge from every body relation of a rule to its head relation
///
/// Skolem atoms do not create edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: Graph<String, (), Directed>,
    label_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph of the given rules.
    pub fn new<'a, Rules: IntoIterator<Item = &'a Rule>>(rules: Rules) -> Self {
        let mut result = Self::default();

        for rule in rules {
            let head = result.add_node(rule.head().relation().name());
            for atom in rule.body().iter().filter(|atom| !atom.is_skolem()) {
                let body = result.add_node(atom.relation().name());
                result.graph.update_edge(body, head, ());
            }
        }

        result
    }

    fn add_node(&mut self, label: &str) -> NodeIndex {
        match self.label_map.entry(label.to_string()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.graph.add_node(entry.key().clone());
                entry.insert(index);
                index
            }
        }
    }

    /// Return the underlying petgraph [Graph].
    pub fn graph(&self) -> &Graph<String, (), Directed> {
        &self.graph
    }

    /// Return the strongly connected components in an order
    /// such that every component only depends on earlier ones.
    ///
    /// The flag of each component tells whether it is recursive.
    pub fn components(&self) -> Vec<(Vec<String>, bool)> {
        // tarjan_scc returns the components in reverse topological order
        let mut components = petgraph::algo::tarjan_scc(&self.graph);
        components.reverse();

        components
            .into_iter()
            .map(|component| {
                let recursive = component.len() > 1
                    || component
                        .iter()
                        .any(|&node| self.graph.contains_edge(node, node));
                let mut names = component
                    .into_iter()
                    .map(|node| self.graph[node].clone())
                    .collect::<Vec<_>>();
                names.sort();

                (names, recursive)
            })
            .collect()
    }

    /// Return whether some relation depends on itself.
    pub fn is_recursive(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}
