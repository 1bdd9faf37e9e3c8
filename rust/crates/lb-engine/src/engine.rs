//! Facade tying configuration, planning, execution, and state persistence together. This is the
//! entry point both `lb-cli` and any embedding code should use.

use std::path::PathBuf;
use std::sync::Arc;

use lb_core::config::Config;
use lb_core::error::BuildError;
use lb_core::Logger;
use lb_core::Result;

use crate::executor::{Executor, StatusCallback};
use crate::planner::Planner;
use crate::reporter::describe_workflow;
use crate::state::StateManager;

pub struct Engine {
    config: Config,
    state: StateManager,
}

impl Engine {
    pub fn new(config: Config, state_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            state: StateManager::new(state_path),
        }
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.config.has_profile(name)
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.config.profile_names()
    }

    /// Plans and runs `profile` up to `final_step` (or every terminal step, if `None`).
    ///
    /// State is loaded once at the start and threaded through planning and execution; the
    /// executor persists it back at the end (or immediately on a halting failure).
    pub async fn execute(
        &self,
        profile: &str,
        final_step: Option<&str>,
        logger: Arc<dyn Logger>,
        status_cb: Option<Arc<StatusCallback>>,
    ) -> Result<bool> {
        let final_step = self.resolve_final_step(final_step);
        let mut state = self.state.load();
        let planner = Planner::new(&self.config);
        let plan = planner.plan_build(&state, profile, final_step.as_deref()).await?;

        let executor = Executor::new(logger, self.config.max_workers(), status_cb);
        executor
            .execute_plan(&plan, &mut state, |s| self.state.save(s))
            .await
    }

    /// Runs every profile in `PROFILE_GROUPS[group_name]` in sequence, stopping at the first
    /// profile that fails.
    pub async fn execute_group(
        &self,
        group_name: &str,
        logger: Arc<dyn Logger>,
        status_cb: Option<Arc<StatusCallback>>,
    ) -> Result<bool> {
        let profiles = self
            .config
            .profile_groups
            .get(group_name)
            .ok_or_else(|| BuildError::UnknownProfile {
                name: group_name.to_string(),
                available: self.config.profile_groups.keys().cloned().collect::<Vec<_>>().join(", "),
            })?
            .clone();

        for (index, profile) in profiles.iter().enumerate() {
            logger.log(&format!(
                "=== Group '{group_name}': profile '{profile}' ({}/{}) ===",
                index + 1,
                profiles.len()
            ));
            let ok = self.execute(profile, None, logger.clone(), status_cb.clone()).await?;
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Falls back to `DEFAULT_WORKFLOW_STEP` when the caller gives no explicit target.
    fn resolve_final_step(&self, final_step: Option<&str>) -> Option<String> {
        final_step
            .map(str::to_string)
            .or_else(|| self.config.default_workflow_step.clone())
    }

    /// Renders a Markdown report of `profile` (or just the path to `final_step`, falling back to
    /// `DEFAULT_WORKFLOW_STEP` when unset) with every step's command resolved against persisted
    /// state, the same way `execute` would plan it.
    pub async fn describe(&self, profile: &str, final_step: Option<&str>) -> Result<String> {
        let final_step = self.resolve_final_step(final_step);
        let state = self.state.load();
        let planner = Planner::new(&self.config);
        let plan = planner.plan_build(&state, profile, final_step.as_deref()).await?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
        Ok(describe_workflow(&self.config, &plan, profile, final_step.as_deref(), &timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_core::TracingLogger;
    use std::collections::HashMap;

    fn config(yaml: &str) -> Config {
        Config::from_str(yaml, &HashMap::new()).unwrap()
    }

    #[tokio::test]
    async fn describe_does_not_require_execution() {
        let yaml = "PROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n";
        let cfg = config(yaml);
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(cfg, dir.path().join("state.json"));
        let report = engine.describe("default", None).await.unwrap();
        assert!(report.contains("### a"));
    }

    #[tokio::test]
    async fn execute_runs_a_touch_step() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.txt");
        let yaml = format!(
            "PROFILES:\n  default: {{}}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {{OUTPUT}}\"\n    OUTPUT: \"{}\"\n",
            output.display()
        );
        let cfg = config(&yaml);
        let engine = Engine::new(cfg, dir.path().join("state.json"));
        let ok = engine
            .execute("default", None, Arc::new(TracingLogger), None)
            .await
            .unwrap();
        assert!(ok);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn default_workflow_step_is_used_when_no_final_step_given() {
        let yaml = "DEFAULT_WORKFLOW_STEP: a\nPROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n  b:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/b.txt\"\n";
        let cfg = config(yaml);
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(cfg, dir.path().join("state.json"));
        let report = engine.describe("default", None).await.unwrap();
        assert!(report.contains("**Target Output:** `out/a.txt`"));
    }

    #[tokio::test]
    async fn unknown_group_is_rejected() {
        let yaml = "PROFILES:\n  default: {}\nWORKFLOW:\n  a:\n    RULE:\n      NAME: touch\n      COMMAND: \"touch {OUTPUT}\"\n    OUTPUT: \"out/a.txt\"\n";
        let cfg = config(yaml);
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(cfg, dir.path().join("state.json"));
        let err = engine
            .execute_group("nightly", Arc::new(TracingLogger), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownProfile { .. }));
    }
}
