//! Dependency graph construction: validates `REQUIRES` edges, detects cycles, and produces
//! topological orderings and generations (layers) for the executor's generation-barrier
//! scheduling.
//!
//! A workflow's steps are stored in a `HashMap`, which carries no useful iteration order, so this
//! graph breaks ties alphabetically by step name wherever Kahn's algorithm has more than one
//! ready node, keeping planning deterministic across runs. See DESIGN.md.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use lb_core::config::StepConfig;
use lb_core::error::BuildError;
use lb_core::Result;

use tracing::{debug, instrument};

/// The workflow DAG: one node per step, one edge per `REQUIRES` entry.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: HashSet<String>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, Vec<String>>,
    topological_order: Vec<String>,
}

impl WorkflowGraph {
    /// Build the full graph from a workflow's step map, validating that every `REQUIRES` entry
    /// names a known step.
    #[instrument(skip(workflow))]
    pub fn build(workflow: &HashMap<String, StepConfig>) -> Result<Self> {
        let nodes: HashSet<String> = workflow.keys().cloned().collect();
        let mut children: HashMap<String, Vec<String>> =
            nodes.iter().map(|n| (n.clone(), Vec::new())).collect();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();

        for (name, step) in workflow {
            for dep in &step.requires {
                if !nodes.contains(dep) {
                    return Err(BuildError::UnknownDependency {
                        step: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                children.get_mut(dep).expect("dep validated above").push(name.clone());
            }
            parents.insert(name.clone(), step.requires.clone());
        }

        for child_list in children.values_mut() {
            child_list.sort();
        }

        let topological_order = Self::topological_sort(&nodes, &parents, &children)?;

        debug!(steps = nodes.len(), "built workflow graph");

        Ok(Self {
            nodes,
            children,
            parents,
            topological_order,
        })
    }

    fn topological_sort(
        nodes: &HashSet<String>,
        parents: &HashMap<String, Vec<String>>,
        children: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<String>> {
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut ready: BTreeSet<String> = BTreeSet::new();
        let mut order: Vec<String> = Vec::with_capacity(nodes.len());

        for name in nodes {
            let degree = parents.get(name).map(Vec::len).unwrap_or(0);
            in_degree.insert(name.clone(), degree);
            if degree == 0 {
                ready.insert(name.clone());
            }
        }

        while let Some(name) = ready.iter().next().cloned() {
            ready.remove(&name);
            order.push(name.clone());
            for child in children.get(&name).map(Vec::as_slice).unwrap_or(&[]) {
                let degree = in_degree.get_mut(child).expect("child must be indexed");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child.clone());
                }
            }
        }

        if order.len() != nodes.len() {
            let in_order: HashSet<&String> = order.iter().collect();
            let mut remaining: Vec<String> = nodes
                .iter()
                .filter(|n| !in_order.contains(n))
                .cloned()
                .collect();
            remaining.sort();
            return Err(BuildError::CycleDetected(remaining.join(", ")));
        }

        Ok(order)
    }

    /// The subgraph containing `final_step` and all its transitive dependencies, or the whole
    /// graph when `final_step` is `None`.
    pub fn execution_subgraph(&self, final_step: Option<&str>) -> Result<WorkflowGraph> {
        let Some(target) = final_step else {
            return Ok(self.clone());
        };
        if !self.nodes.contains(target) {
            return Err(BuildError::UnknownStep(target.to_string()));
        }

        let mut keep: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(target.to_string());
        keep.insert(target.to_string());

        while let Some(name) = queue.pop_front() {
            for parent in self.parents.get(&name).map(Vec::as_slice).unwrap_or(&[]) {
                if keep.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
        }

        let nodes = keep;
        let children: HashMap<String, Vec<String>> = nodes
            .iter()
            .map(|n| {
                let kids: Vec<String> = self
                    .children
                    .get(n)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .filter(|c| nodes.contains(*c))
                    .cloned()
                    .collect();
                (n.clone(), kids)
            })
            .collect();
        let parents: HashMap<String, Vec<String>> = nodes
            .iter()
            .map(|n| {
                let ps = self
                    .parents
                    .get(n)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .to_vec();
                (n.clone(), ps)
            })
            .collect();

        let topological_order = self
            .topological_order
            .iter()
            .filter(|n| nodes.contains(*n))
            .cloned()
            .collect();

        Ok(WorkflowGraph {
            nodes,
            children,
            parents,
            topological_order,
        })
    }

    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    /// Layers of the topological order: generation 0 has no dependencies; generation k's nodes
    /// all depend only on nodes in generations `< k`. The executor runs a generation's steps
    /// concurrently and waits for all of them before starting the next.
    pub fn topological_generations(&self) -> Vec<Vec<String>> {
        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut remaining: BTreeSet<String> = self.nodes.iter().cloned().collect();

        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    self.parents
                        .get(*name)
                        .map(|deps| deps.iter().all(|d| completed.contains(d)))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                break; // unreachable once `build` has validated acyclicity
            }

            for name in &ready {
                remaining.remove(name);
                completed.insert(name.clone());
            }
            layers.push(ready);
        }

        layers
    }

    pub fn children(&self, step: &str) -> &[String] {
        self.children.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents(&self, step: &str) -> &[String] {
        self.parents.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All descendants of `step` (transitive children), not including `step` itself.
    pub fn descendants(&self, step: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut queue: VecDeque<String> = self.children(step).to_vec().into();
        while let Some(name) = queue.pop_front() {
            if result.insert(name.clone()) {
                for child in self.children(&name) {
                    queue.push_back(child.clone());
                }
            }
        }
        result
    }

    pub fn contains(&self, step: &str) -> bool {
        self.nodes.contains(step)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_core::config::{InputStyle, OneOrMany, RuleConfig};
    use serde_json::Map;

    fn step(requires: &[&str]) -> StepConfig {
        StepConfig {
            rule: RuleConfig {
                name: "touch".to_string(),
                command: "touch {OUTPUT}".to_string(),
                dash: "-".to_string(),
                input_style: InputStyle::Positional,
                input_switch_name: None,
                input_quoted: true,
                unquoted_params: Vec::new(),
                unquoted_positionals: false,
            },
            inputs: OneOrMany::default(),
            output: "out".to_string(),
            parameters: Map::new(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            positional_filenames: OneOrMany::default(),
            description: None,
        }
    }

    fn workflow(pairs: &[(&str, &[&str])]) -> HashMap<String, StepConfig> {
        pairs
            .iter()
            .map(|(name, reqs)| (name.to_string(), step(reqs)))
            .collect()
    }

    #[test]
    fn simple_chain_orders_by_dependency() {
        let wf = workflow(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let graph = WorkflowGraph::build(&wf).unwrap();
        let order = graph.topological_order();
        let pos = |s: &str| order.iter().position(|x| x == s).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn generations_group_independent_steps() {
        let wf = workflow(&[
            ("init", &[]),
            ("a", &["init"]),
            ("b", &["init"]),
            ("c", &["init"]),
            ("final", &["a", "b", "c"]),
        ]);
        let graph = WorkflowGraph::build(&wf).unwrap();
        let gens = graph.topological_generations();
        assert_eq!(gens.len(), 3);
        assert_eq!(gens[0], vec!["init".to_string()]);
        assert_eq!(gens[1], vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(gens[2], vec!["final".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let wf = workflow(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        let err = WorkflowGraph::build(&wf).unwrap_err();
        assert!(matches!(err, BuildError::CycleDetected(_)));
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let wf = workflow(&[("a", &["nonexistent"])]);
        let err = WorkflowGraph::build(&wf).unwrap_err();
        assert!(matches!(err, BuildError::UnknownDependency { .. }));
    }

    #[test]
    fn execution_subgraph_keeps_only_ancestors() {
        let wf = workflow(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("unrelated", &[])]);
        let graph = WorkflowGraph::build(&wf).unwrap();
        let sub = graph.execution_subgraph(Some("b")).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(sub.contains("a"));
        assert!(sub.contains("b"));
        assert!(!sub.contains("c"));
        assert!(!sub.contains("unrelated"));
    }

    #[test]
    fn execution_subgraph_rejects_unknown_step() {
        let wf = workflow(&[("a", &[])]);
        let graph = WorkflowGraph::build(&wf).unwrap();
        let err = graph.execution_subgraph(Some("nope")).unwrap_err();
        assert!(matches!(err, BuildError::UnknownStep(_)));
    }

    #[test]
    fn descendants_are_transitive() {
        let wf = workflow(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let graph = WorkflowGraph::build(&wf).unwrap();
        let desc = graph.descendants("a");
        assert!(desc.contains("b"));
        assert!(desc.contains("c"));
    }
}
