//! FILENAME: formula/src/dependency_graph.rs
//! PURPOSE: Directed graph over calculation names for cycle detection.
//! CONTEXT: Calculated fields may reference other calculated fields. A
//! cycle would make the workbook unopenable, so after all calculations
//! are built the generator runs a topological sort over this graph and
//! excludes every member of every cycle.
//!
//! TERMINOLOGY:
//! - Precedents: names a calculation references (its inputs).
//!   If Margin = [Profit] / [Revenue Total], then Revenue Total is a
//!   precedent of Margin (plain fields never have precedents of their own
//!   and are not tracked here).
//! - Dependents: calculations that reference a given name (reverse lookup).
//!
//! USAGE:
//! 1. As each calculation is built, call `set_dependencies()` with its
//!    name and the calculation names it references.
//! 2. After the full set is built, call `cycle_members()`; exclude every
//!    returned name.

use std::collections::{HashMap, HashSet, VecDeque};

/// Tracks reference relationships between named calculations.
/// Maintains both forward (precedents) and reverse (dependents) mappings
/// for efficient lookups in either direction.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// For each calculation, the set of calculation names it references.
    precedents: HashMap<String, HashSet<String>>,

    /// For each name, the set of calculations that reference it.
    dependents: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// Creates a new, empty dependency graph.
    pub fn new() -> Self {
        DependencyGraph {
            precedents: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Sets the dependencies for a calculation, replacing any previous set.
    /// Updates both the precedents and dependents mappings.
    ///
    /// # Note
    /// Cycles are allowed at insertion time; `cycle_members()` finds them
    /// once the whole set is known.
    pub fn set_dependencies(&mut self, name: &str, new_precedents: HashSet<String>) {
        self.clear_dependencies(name);

        if !new_precedents.is_empty() {
            for prec in &new_precedents {
                self.dependents
                    .entry(prec.clone())
                    .or_default()
                    .insert(name.to_string());
            }
            self.precedents.insert(name.to_string(), new_precedents);
        } else {
            // Still record the node so it participates in the sort.
            self.precedents.insert(name.to_string(), HashSet::new());
        }
    }

    /// Clears all dependencies for a calculation.
    pub fn clear_dependencies(&mut self, name: &str) {
        if let Some(old_precs) = self.precedents.remove(name) {
            for prec in old_precs {
                if let Some(deps) = self.dependents.get_mut(&prec) {
                    deps.remove(name);
                    if deps.is_empty() {
                        self.dependents.remove(&prec);
                    }
                }
            }
        }
    }

    /// Returns the direct precedents of a calculation.
    pub fn get_precedents(&self, name: &str) -> Option<&HashSet<String>> {
        self.precedents.get(name)
    }

    /// Returns the direct dependents of a name.
    pub fn get_dependents(&self, name: &str) -> Option<&HashSet<String>> {
        self.dependents.get(name)
    }

    /// Returns every calculation that sits on a dependency cycle.
    ///
    /// Runs Kahn's algorithm over the whole graph: nodes are repeatedly
    /// removed once they have no remaining precedents. A node that cannot
    /// be removed is either on a cycle or merely downstream of one; the
    /// final reachability pass keeps only true cycle participants. Callers
    /// that want to drop downstream nodes as well do so by re-resolving
    /// dependencies after the exclusion.
    pub fn cycle_members(&self) -> HashSet<String> {
        // Build in-degree map, counting only edges between tracked nodes.
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for (name, precs) in &self.precedents {
            let count = precs
                .iter()
                .filter(|p| self.precedents.contains_key(p.as_str()))
                .count();
            in_degree.insert(name.as_str(), count);
        }

        // Start from nodes with no tracked precedents.
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut resolved = 0usize;

        while let Some(name) = queue.pop_front() {
            resolved += 1;

            if let Some(deps) = self.dependents.get(name) {
                for dep in deps {
                    if let Some(deg) = in_degree.get_mut(dep.as_str()) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dep.as_str());
                        }
                    }
                }
            }
        }

        if resolved == self.precedents.len() {
            return HashSet::new();
        }

        // Stuck nodes: remaining in-degree > 0. A stuck node is a cycle
        // participant only if it can reach itself through precedents.
        let stuck: HashSet<&str> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg > 0)
            .map(|(&name, _)| name)
            .collect();

        stuck
            .iter()
            .filter(|name| self.can_reach_itself(name, &stuck))
            .map(|name| name.to_string())
            .collect()
    }

    /// DFS through precedent chains (restricted to `within`) checking
    /// whether `start` is reachable from its own precedents.
    fn can_reach_itself(&self, start: &str, within: &HashSet<&str>) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        if let Some(precs) = self.precedents.get(start) {
            for prec in precs {
                if within.contains(prec.as_str()) {
                    stack.push(prec.as_str());
                }
            }
        }

        while let Some(current) = stack.pop() {
            if current == start {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(precs) = self.precedents.get(current) {
                for prec in precs {
                    if within.contains(prec.as_str()) && !visited.contains(prec.as_str()) {
                        stack.push(prec.as_str());
                    }
                }
            }
        }

        false
    }

    /// Returns the number of tracked calculations.
    pub fn node_count(&self) -> usize {
        self.precedents.len()
    }

    /// Returns the total number of dependency relationships.
    pub fn dependency_count(&self) -> usize {
        self.precedents.values().map(|v| v.len()).sum()
    }
}
