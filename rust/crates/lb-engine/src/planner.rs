//! Diffs the generated command map against persisted state to decide which steps must rerun,
//! then propagates staleness to every descendant.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lb_codegen::{build_base_context, generate_for_node, ResolvedCommand};
use lb_core::config::Config;
use lb_core::error::BuildError;
use lb_core::time::{mtime_secs, STALENESS_SETTLE_DELAY};
use lb_core::Result;
use lb_dag::WorkflowGraph;

use crate::state::BuildState;

/// Why a step is considered stale (or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateCode {
    UpToDate,
    MissingOutput,
    NotTracked,
    CommandChanged,
    InputsChanged,
    ParamsChanged,
    NewerInput,
    MissingInput,
    StaleTarget,
}

impl UpdateCode {
    pub fn is_stale(self) -> bool {
        self != UpdateCode::UpToDate
    }
}

#[derive(Debug, Clone)]
pub struct BuildStep {
    pub name: String,
    pub resolved: ResolvedCommand,
    pub code: UpdateCode,
    /// Extra detail for the code, e.g. the offending input's filename for `NewerInput`.
    pub context: String,
}

#[derive(Debug)]
pub struct BuildPlan {
    pub steps_to_run: Vec<BuildStep>,
    pub steps_to_skip: Vec<BuildStep>,
    pub graph: WorkflowGraph,
    pub command_map: HashMap<String, ResolvedCommand>,
}

pub struct Planner<'a> {
    config: &'a Config,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub async fn plan_build(
        &self,
        state: &BuildState,
        profile_name: &str,
        final_step: Option<&str>,
    ) -> Result<BuildPlan> {
        let profile = self.config.profiles.get(profile_name).ok_or_else(|| {
            BuildError::UnknownProfile {
                name: profile_name.to_string(),
                available: self.config.profile_names().join(", "),
            }
        })?;

        let full_graph = WorkflowGraph::build(&self.config.workflow)?;
        let graph = full_graph.execution_subgraph(final_step)?;

        let context = build_base_context(&self.config.general, profile_name, profile);

        let mut resolved_outputs: HashMap<String, String> = HashMap::new();
        let mut command_map: HashMap<String, ResolvedCommand> = HashMap::new();
        for name in graph.topological_order() {
            let step_config = self
                .config
                .workflow
                .get(name)
                .expect("graph nodes come from config.workflow");
            let resolved = generate_for_node(
                name,
                step_config,
                &self.config.general,
                profile,
                &context,
                &resolved_outputs,
            )
            .map_err(|source| BuildError::Step {
                step: name.clone(),
                source: Box::new(source),
            })?;
            resolved_outputs.insert(name.clone(), resolved.output.clone());
            command_map.insert(name.clone(), resolved);
        }

        let mut initially_outdated: HashMap<String, (UpdateCode, String)> = HashMap::new();
        for name in graph.topological_order() {
            let resolved = &command_map[name];
            let (code, ctx) = self.is_outdated(resolved, state).await;
            if code.is_stale() {
                initially_outdated.insert(name.clone(), (code, ctx));
            }
        }

        let mut all_to_run: HashMap<String, (UpdateCode, String)> = initially_outdated.clone();
        for name in initially_outdated.keys() {
            for descendant in graph.descendants(name) {
                all_to_run
                    .entry(descendant)
                    .or_insert_with(|| (UpdateCode::StaleTarget, String::new()));
            }
        }

        let mut steps_to_run = Vec::new();
        let mut steps_to_skip = Vec::new();
        for name in graph.topological_order() {
            let resolved = command_map[name].clone();
            if let Some((code, ctx)) = all_to_run.get(name) {
                steps_to_run.push(BuildStep {
                    name: name.clone(),
                    resolved,
                    code: *code,
                    context: ctx.clone(),
                });
            } else {
                steps_to_skip.push(BuildStep {
                    name: name.clone(),
                    resolved,
                    code: UpdateCode::UpToDate,
                    context: String::new(),
                });
            }
        }

        Ok(BuildPlan {
            steps_to_run,
            steps_to_skip,
            graph,
            command_map,
        })
    }

    async fn is_outdated(&self, resolved: &ResolvedCommand, state: &BuildState) -> (UpdateCode, String) {
        let output_path = Path::new(&resolved.output);
        if !output_path.exists() {
            return (UpdateCode::MissingOutput, String::new());
        }
        let Some(stored) = state.get(&resolved.output) else {
            return (UpdateCode::NotTracked, String::new());
        };
        if stored.hashes.command != resolved.hashes.command {
            return (UpdateCode::CommandChanged, String::new());
        }
        if stored.hashes.inputs != resolved.hashes.inputs {
            return (UpdateCode::InputsChanged, String::new());
        }
        if stored.hashes.params != resolved.hashes.params {
            return (UpdateCode::ParamsChanged, String::new());
        }

        tokio::time::sleep(STALENESS_SETTLE_DELAY).await;

        for input in &resolved.input_files {
            let input_path = Path::new(input);
            if !input_path.exists() {
                let basename = input_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| input.clone());
                return (UpdateCode::MissingInput, basename);
            }
            if let Ok(mtime) = mtime_secs(input_path) {
                if mtime > stored.mtime {
                    let basename = input_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| input.clone());
                    return (UpdateCode::NewerInput, basename);
                }
            }
        }

        (UpdateCode::UpToDate, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map2;

    fn config(yaml: &str) -> Config {
        Config::from_str(yaml, &Map2::new()).unwrap()
    }

    #[tokio::test]
    async fn first_build_everything_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.txt");
        let yaml = format!(
            "PROFILES:\n  default: {{}}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {{OUTPUT}}\"\n    OUTPUT: \"{}\"\n",
            output.display()
        );
        let cfg = config(&yaml);
        let planner = Planner::new(&cfg);
        let plan = planner.plan_build(&BuildState::new(), "default", None).await.unwrap();
        assert_eq!(plan.steps_to_run.len(), 1);
        assert_eq!(plan.steps_to_run[0].code, UpdateCode::MissingOutput);
        assert!(plan.steps_to_skip.is_empty());
    }

    #[test]
    fn update_code_ordering_matches_priority() {
        assert!(UpdateCode::UpToDate < UpdateCode::MissingOutput);
        assert!(UpdateCode::NewerInput < UpdateCode::MissingInput);
        assert!(UpdateCode::MissingInput < UpdateCode::StaleTarget);
    }

    #[tokio::test]
    async fn unknown_profile_lists_available_ones() {
        let yaml = "PROFILES:\n  prod: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n";
        let cfg = config(yaml);
        let planner = Planner::new(&cfg);
        let err = planner
            .plan_build(&BuildState::new(), "missing", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownProfile { .. }));
    }
}
