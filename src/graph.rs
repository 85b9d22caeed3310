//! C1 — Dependency Graph: validation, cycle detection, deterministic start
//! order.
//!
//! No teacher file implements this directly; structure (small single-purpose
//! module, `thiserror` taxonomy, colocated tests) follows the rest of the
//! crate's conventions.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("process `{name}` depends on unknown process `{dep}`")]
    DepMissing { name: String, dep: String },
    #[error("process `{0}` depends on itself")]
    SelfDep(String),
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// `name -> set of prerequisite names`. Uses `BTreeMap`/`BTreeSet` so
/// iteration order is always lexicographic without an explicit sort step.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build a graph from `name -> dependencies` pairs. Validates missing
    /// deps and self-deps eagerly; does not check for cycles (call
    /// [`DependencyGraph::validate`] for that).
    pub fn build<I, S>(specs: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, deps) in specs {
            let name = name.into();
            let deps: BTreeSet<String> = deps.into_iter().map(Into::into).collect();
            edges.insert(name, deps);
        }

        for (name, deps) in &edges {
            for dep in deps {
                if dep == name {
                    return Err(GraphError::SelfDep(name.clone()));
                }
                if !edges.contains_key(dep) {
                    return Err(GraphError::DepMissing {
                        name: name.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        Ok(DependencyGraph { edges })
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// Names that declare `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, deps: Vec<String>) -> Result<(), GraphError> {
        let name = name.into();
        let dep_set: BTreeSet<String> = deps.into_iter().collect();
        for dep in &dep_set {
            if dep == &name {
                return Err(GraphError::SelfDep(name));
            }
            if !self.edges.contains_key(dep) {
                return Err(GraphError::DepMissing {
                    name,
                    dep: dep.clone(),
                });
            }
        }
        self.edges.insert(name, dep_set);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.edges.remove(name);
    }

    /// `hasCycle() -> (bool, cyclePath)`. The returned path repeats the
    /// offending node at both ends so it is self-describing.
    pub fn has_cycle(&self) -> (bool, Vec<String>) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = self
            .edges
            .keys()
            .map(|n| (n.as_str(), Mark::Unvisited))
            .collect();
        let mut stack: Vec<String> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            edges: &'a BTreeMap<String, BTreeSet<String>>,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::InStack);
            stack.push(node.to_string());

            if let Some(deps) = edges.get(node) {
                for dep in deps {
                    match marks.get(dep.as_str()) {
                        Some(Mark::InStack) => {
                            let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                            let mut cycle = stack[start..].to_vec();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(Mark::Done) => {}
                        _ => {
                            if let Some(cycle) = visit(dep, edges, marks, stack) {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for name in self.edges.keys() {
            if marks.get(name.as_str()) == Some(&Mark::Unvisited) {
                if let Some(cycle) = visit(name, &self.edges, &mut marks, &mut stack) {
                    return (true, cycle);
                }
            }
        }

        (false, Vec::new())
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let (found, path) = self.has_cycle();
        if found {
            return Err(GraphError::Cycle(path));
        }
        Ok(())
    }

    /// Kahn's algorithm; ties among zero-in-degree nodes broken
    /// lexicographically via `BTreeSet`'s natural ordering. Pure function of
    /// the edge set (testable, deterministic).
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.validate()?;

        // A node's in-degree is its own prerequisite count (edge dep -> name).
        let mut in_degree: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(n, deps)| (n.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut order = Vec::with_capacity(self.edges.len());
        while let Some(&name) = ready.iter().next() {
            ready.remove(name);
            order.push(name.to_string());

            for dependent in self.dependents_of(name) {
                let deg = in_degree.get_mut(dependent.as_str()).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(
                        self.edges
                            .get_key_value(&dependent)
                            .map(|(k, _)| k.as_str())
                            .unwrap(),
                    );
                }
            }
        }

        if order.len() != self.edges.len() {
            // Shouldn't happen: validate() already rejected cycles.
            let (_, path) = self.has_cycle();
            return Err(GraphError::Cycle(path));
        }

        Ok(order)
    }

    /// Reverse of [`DependencyGraph::topological_order`], used for shutdown
    /// ordering (spec §4.7 step 1).
    pub fn reverse_topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, deps: &[&str]) -> (String, Vec<String>) {
        (
            name.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[test]
    fn empty_graph_yields_empty_order() {
        let g = DependencyGraph::build::<_, String>(vec![]).unwrap();
        assert!(g.topological_order().unwrap().is_empty());
    }

    #[test]
    fn s1_topological_startup_order() {
        // a; b depends_on [a]; c depends_on [a]; d depends_on [b,c]
        let g = DependencyGraph::build(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b", "c"]),
        ])
        .unwrap();

        assert_eq!(
            g.topological_order().unwrap(),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(
            g.reverse_topological_order().unwrap(),
            vec!["d", "c", "b", "a"]
        );
    }

    #[test]
    fn lexicographic_tie_break_is_deterministic() {
        let g = DependencyGraph::build(vec![spec("z", &[]), spec("a", &[]), spec("m", &[])])
            .unwrap();
        assert_eq!(g.topological_order().unwrap(), vec!["a", "m", "z"]);
    }

    #[test]
    fn self_dep_rejected() {
        let err = DependencyGraph::build(vec![spec("a", &["a"])]).unwrap_err();
        assert_eq!(err, GraphError::SelfDep("a".to_string()));
    }

    #[test]
    fn missing_dep_rejected() {
        let err = DependencyGraph::build(vec![spec("a", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DepMissing {
                name: "a".to_string(),
                dep: "ghost".to_string()
            }
        );
    }

    #[test]
    fn cycle_detected_and_self_describing() {
        let g = DependencyGraph::build(vec![spec("a", &["b"]), spec("b", &["a"])]).unwrap();
        let (found, path) = g.has_cycle();
        assert!(found);
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn insert_respects_existing_validation() {
        let mut g = DependencyGraph::build(vec![spec("a", &[])]).unwrap();
        g.insert("b", vec!["a".to_string()]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec!["a", "b"]);
        assert!(g.insert("c", vec!["ghost".to_string()]).is_err());
    }
}
