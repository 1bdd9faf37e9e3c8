//! Renders a resolved build plan as a human-readable Markdown report with an embedded Mermaid
//! graph, for `lb-cli describe`. Grounded on `examples/original_source/LiteBuild/build_engine.py`'s
//! `describe_workflow`, which runs a `BuildPlanner` first specifically so the report can show
//! each step's rendered command rather than its raw template.

use lb_core::config::Config;

use crate::planner::BuildPlan;

const DEFAULT_PROJECT_NAME: &str = "Build Project";

/// Describes a resolved `plan` as Markdown. `timestamp` is caller-supplied (formatted by the
/// caller via `chrono`) since this crate may not call `chrono::Local::now()` directly in a way
/// that stays deterministic for tests.
pub fn describe_workflow(config: &Config, plan: &BuildPlan, profile_name: &str, final_step: Option<&str>, timestamp: &str) -> String {
    let project_name = config
        .general
        .get("PROJECT_NAME")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROJECT_NAME);

    let graph = &plan.graph;
    let order = graph.topological_order();

    let mut out = String::new();

    out.push_str(&format!("# {project_name} Pipeline Documentation\n\n"));
    if order.is_empty() {
        out.push_str(&format!("**Profile:** `{profile_name}`  \n**Date:** {timestamp}  \n\nNo steps defined for this profile.\n"));
        return out;
    }

    let target_step = final_step.unwrap_or_else(|| order.last().expect("order is non-empty").as_str());
    let target_output = plan
        .command_map
        .get(target_step)
        .map(|r| r.output.as_str())
        .unwrap_or("(unknown)");

    out.push_str(&format!("**Profile:** `{profile_name}`  \n"));
    out.push_str(&format!("**Date:** {timestamp}  \n"));
    out.push_str(&format!("**Target Output:** `{target_output}`\n\n"));
    out.push_str("---\n\n");

    if let Some(overview) = &config.overview {
        out.push_str("## Overview\n\n");
        out.push_str(overview.trim());
        out.push_str("\n\n---\n\n");
    }

    out.push_str("## Workflow\n\n```mermaid\nflowchart TD\n");
    for name in order {
        let step = &config.workflow[name];
        let shape = node_shape(name, step.requires.is_empty());
        out.push_str(&format!("    {shape}\n"));
    }
    for name in order {
        for child in graph.children(name) {
            if graph.contains(child) {
                out.push_str(&format!("    {name} --> {child}\n"));
            }
        }
    }
    out.push_str("```\n\n");

    out.push_str("## Detailed Steps\n\n");
    for name in order {
        let step = &config.workflow[name];
        let resolved = &plan.command_map[name];
        out.push_str(&format!("### {name}\n\n"));
        if let Some(description) = &step.description {
            out.push_str(&format!("> {description}\n\n"));
        } else {
            out.push_str(&format!("_Executes rule: `{}`_\n\n", step.rule.name));
        }
        if !resolved.input_files.is_empty() {
            out.push_str("**Inputs:**\n\n");
            for input in &resolved.input_files {
                out.push_str(&format!("* `{input}`\n"));
            }
            out.push('\n');
        }
        out.push_str(&format!("**Output:** `{}`\n\n", resolved.output));
        out.push_str("**Command:**\n\n```bash\n");
        out.push_str(&resolved.cmd_string);
        out.push_str("\n```\n\n---\n\n");
    }

    out
}

/// Source steps (no declared dependencies) render as rounded nodes; everything else is a process.
fn node_shape(name: &str, is_source: bool) -> String {
    if is_source {
        format!("{name}([{name}])")
    } else {
        format!("{name}[{name}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Planner;
    use crate::state::BuildState;
    use std::collections::HashMap;

    fn config(yaml: &str) -> Config {
        Config::from_str(yaml, &HashMap::new()).unwrap()
    }

    #[tokio::test]
    async fn describes_a_two_step_workflow_with_resolved_commands() {
        let yaml = "GENERAL:\n  PROJECT_NAME: Demo\nPROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n  b:\n    RULE:\n      NAME: cp\n      COMMAND: \"cp {REQUIRES[0]} {OUTPUT}\"\n    INPUTS: \"{REQUIRES[0]}\"\n    OUTPUT: \"out/b.txt\"\n    REQUIRES: [a]\n";
        let cfg = config(yaml);
        let planner = Planner::new(&cfg);
        let plan = planner.plan_build(&BuildState::new(), "default", None).await.unwrap();

        let report = describe_workflow(&cfg, &plan, "default", None, "2026-07-27 12:00");

        assert!(report.contains("# Demo Pipeline Documentation"));
        assert!(report.contains("**Target Output:** `out/b.txt`"));
        assert!(report.contains("a --> b"));
        assert!(report.contains("cp out/a.txt out/b.txt"), "must show the rendered command, not the raw template");
        assert!(report.contains("* `out/a.txt`"), "must show the resolved input path");
    }

    #[tokio::test]
    async fn falls_back_to_default_project_name() {
        let yaml = "PROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n";
        let cfg = config(yaml);
        let planner = Planner::new(&cfg);
        let plan = planner.plan_build(&BuildState::new(), "default", None).await.unwrap();
        let report = describe_workflow(&cfg, &plan, "default", None, "2026-07-27 12:00");
        assert!(report.starts_with("# Build Project Pipeline Documentation"));
    }

    #[test]
    fn source_steps_render_as_rounded_nodes() {
        assert_eq!(node_shape("a", true), "a([a])");
        assert_eq!(node_shape("a", false), "a[a]");
    }
}
