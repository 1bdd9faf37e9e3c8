//! Generation-barrier executor: runs each topological generation's ready steps concurrently on a
//! bounded pool, then waits for the whole generation before advancing. First failure in a
//! generation halts the build after its siblings finish; no later generation starts.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;

use lb_core::error::BuildError;
use lb_core::time::now_secs;
use lb_core::{Logger, Result};

use crate::planner::{BuildPlan, BuildStep};
use crate::state::{BuildState, StoredHashes, StoredStepState};

const TRUNCATE_LIMIT: usize = 400;

/// `(kind, current, total, state)` — mirrors the external status-callback contract.
pub type StatusCallback = dyn Fn(&str, usize, usize, &str) + Send + Sync;

struct StepOutcome {
    name: String,
    output: String,
    hashes: StoredHashes,
    mtime: f64,
    elapsed_secs: f64,
}

pub struct Executor {
    logger: Arc<dyn Logger>,
    max_workers: usize,
    status_cb: Option<Arc<StatusCallback>>,
}

impl Executor {
    pub fn new(logger: Arc<dyn Logger>, max_workers: usize, status_cb: Option<Arc<StatusCallback>>) -> Self {
        Self {
            logger,
            max_workers: max_workers.max(1),
            status_cb,
        }
    }

    /// Runs `plan`, mutating `state` in place as steps complete and persisting it via
    /// `save_state` at the end (or immediately on a halting failure). Returns `true` on full
    /// success, `false` if any generation contained a failure.
    pub async fn execute_plan(
        &self,
        plan: &BuildPlan,
        state: &mut BuildState,
        save_state: impl Fn(&BuildState) -> Result<()>,
    ) -> Result<bool> {
        for step in &plan.steps_to_skip {
            self.logger.log(&format!("Skipping '{}' (up-to-date)", step.name));
        }

        let total = plan.steps_to_run.len();
        if total == 0 {
            if let Some(cb) = &self.status_cb {
                cb("profile", 0, 0, "done");
            }
            return Ok(true);
        }

        let run_names: HashSet<&str> = plan.steps_to_run.iter().map(|s| s.name.as_str()).collect();
        let mut finished = 0usize;
        let mut durations: Vec<(String, f64)> = Vec::new();

        for generation in plan.graph.topological_generations() {
            let this_gen: Vec<&BuildStep> = plan
                .steps_to_run
                .iter()
                .filter(|s| generation.iter().any(|n| n == &s.name) && run_names.contains(s.name.as_str()))
                .collect();
            if this_gen.is_empty() {
                continue;
            }

            let semaphore = Arc::new(Semaphore::new(self.max_workers));
            let mut handles = Vec::with_capacity(this_gen.len());
            for step in this_gen {
                let step = step.clone();
                let logger = self.logger.clone();
                let permit = semaphore.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                    run_single_command(step, logger).await
                }));
            }

            let mut halt = false;
            for handle in join_all(handles).await {
                match handle {
                    Ok(Ok(outcome)) => {
                        finished += 1;
                        self.logger.log(&format!(
                            "\u{2705} Finished step '{}' [{}/{}]",
                            outcome.name, finished, total
                        ));
                        if let Some(cb) = &self.status_cb {
                            cb("step", finished, total, "done");
                        }
                        durations.push((outcome.name.clone(), outcome.elapsed_secs));
                        state.insert(
                            outcome.output,
                            StoredStepState {
                                hashes: outcome.hashes,
                                mtime: outcome.mtime,
                            },
                        );
                    }
                    Ok(Err(name)) => {
                        halt = true;
                        self.logger.log(&format!("\u{1F53A} Build failed for step '{name}'"));
                        if let Some(cb) = &self.status_cb {
                            cb("step", finished, total, "error");
                        }
                    }
                    Err(join_err) => {
                        halt = true;
                        self.logger.log(&format!("\u{1F53A} Step task panicked: {join_err}"));
                    }
                }
            }

            if halt {
                save_state(state)?;
                return Ok(false);
            }
        }

        save_state(state)?;
        self.print_timing_report(&durations);
        Ok(true)
    }

    fn print_timing_report(&self, durations: &[(String, f64)]) {
        if durations.is_empty() {
            return;
        }
        let mut sorted = durations.to_vec();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let total_cpu_time: f64 = sorted.iter().map(|(_, d)| d).sum();
        let wall_time = sorted.iter().map(|(_, d)| *d).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
        for (name, duration) in &sorted {
            self.logger.debug(&format!("  {:<30} {}", name, format_duration(*duration)));
        }
        let speedup = total_cpu_time / wall_time;
        self.logger.log(&format!(
            "Wall Time: {}  Parallel Speedup: {speedup:.1}x",
            format_duration(wall_time)
        ));
    }
}

fn format_duration(secs: f64) -> String {
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor();
        let rest = secs - minutes * 60.0;
        format!("{minutes:.0}:{rest:05.2}")
    } else {
        format!("{secs:.2}s")
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let head_len = (limit as f64 * 0.4) as usize;
    let tail_len = (limit as f64 * 0.4) as usize;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().rev().take(tail_len).collect::<Vec<_>>().into_iter().rev().collect();
    let truncated = text.chars().count().saturating_sub(head_len + tail_len);
    format!("{head} [ ... {truncated} chars truncated ... ] {tail}")
}

async fn run_single_command(step: BuildStep, logger: Arc<dyn Logger>) -> std::result::Result<StepOutcome, String> {
    let start = Instant::now();
    logger.log(&format!(
        "\u{25B6}\u{FE0F}  Running step '{}': {}",
        step.name,
        update_text(&step)
    ));
    logger.debug(&format!("  [{}]       {}", step.name, truncate(&step.resolved.cmd_string, TRUNCATE_LIMIT)));

    let result: std::result::Result<StepOutcome, BuildError> = async {
        // Combine stderr into stdout, mirroring the original's merged-stream capture.
        let combined = format!("{} 2>&1", step.resolved.cmd_string);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&combined)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::SpawnFailed {
                step: step.name.clone(),
                source,
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            logger.log(&format!("  [{}]       {}", step.name, truncate(line, TRUNCATE_LIMIT)));
        }

        let status = child.wait().await.map_err(|source| BuildError::SpawnFailed {
            step: step.name.clone(),
            source,
        })?;

        if !status.success() {
            return Err(BuildError::NonZeroExit {
                step: step.name.clone(),
                code: status.code().unwrap_or(-1),
            });
        }

        let mtime = lb_core::time::mtime_secs(std::path::Path::new(&step.resolved.output))
            .unwrap_or_else(|_| now_secs());

        Ok(StepOutcome {
            name: step.name.clone(),
            output: step.resolved.output.clone(),
            hashes: StoredHashes {
                command: step.resolved.hashes.command.clone(),
                inputs: step.resolved.hashes.inputs.clone(),
                params: step.resolved.hashes.params.clone(),
            },
            mtime,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }
    .await;

    result.map_err(|err| {
        logger.log(&format!("\u{1F53A} Step '{}' failed: {err}", step.name));
        step.name.clone()
    })
}

fn update_text(step: &BuildStep) -> String {
    use crate::planner::UpdateCode;
    match step.code {
        UpdateCode::UpToDate => "up to date".to_string(),
        UpdateCode::MissingOutput => "output is missing".to_string(),
        UpdateCode::NotTracked => "output is not tracked in build state".to_string(),
        UpdateCode::CommandChanged => "command changed".to_string(),
        UpdateCode::InputsChanged => "inputs changed".to_string(),
        UpdateCode::ParamsChanged => "parameters changed".to_string(),
        UpdateCode::NewerInput => format!("input '{}' is newer than output", step.context),
        UpdateCode::MissingInput => format!("input '{}' is missing", step.context),
        UpdateCode::StaleTarget => "upstream dependency is stale".to_string(),
    }
}
