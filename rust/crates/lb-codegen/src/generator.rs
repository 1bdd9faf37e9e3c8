//! Resolves one workflow step into a fully rendered shell command plus its fingerprint hashes.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use lb_core::config::StepConfig;
use lb_core::error::BuildError;
use lb_core::hash::canonical_sha256_hex;
use lb_core::Result;

use crate::params::{format_inputs_string, format_positional_filenames, format_shell_params, join_inputs_plain};
use crate::shell;
use crate::template::{contains_bare_token, deep_template, expand_strict, value_to_string};

const FORBIDDEN_LATE_BOUND: [&str; 4] = ["{OUTPUT}", "{INPUTS}", "{PARAMETERS}", "{POSITIONAL_FILENAMES}"];

/// The three fingerprints used to decide staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashes {
    pub command: String,
    pub inputs: String,
    pub params: String,
}

/// A step's fully resolved shell command, ready to execute.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub step: String,
    pub cmd_string: String,
    pub input_files: Vec<String>,
    pub output: String,
    pub hashes: Hashes,
}

/// Resolves `step` (named `step_name`) into a [`ResolvedCommand`].
///
/// `context` is the base template context built once per build via
/// [`crate::context::build_base_context`]. `general`/`profile` are passed separately because the
/// per-rule parameter defaults nested under their `PARAMETERS` key are looked up by rule name,
/// not merged flatly into `context`. `resolved_outputs` holds already-resolved `OUTPUT` paths for
/// every step that precedes this one in topological order, to satisfy `{REQUIRES[i]}`.
pub fn generate_for_node(
    step_name: &str,
    step: &StepConfig,
    general: &Map<String, Value>,
    profile: &Map<String, Value>,
    context: &Map<String, Value>,
    resolved_outputs: &HashMap<String, String>,
) -> Result<ResolvedCommand> {
    validate_no_late_bound_placeholders(&step.parameters, step_name)?;

    let merged_params_raw = merge_parameters(general, profile, &step.rule.name, &step.parameters);
    let merged_params = template_map(&merged_params_raw, context, step_name)?;

    let resolved_inputs = resolve_inputs(step_name, step, context, resolved_outputs)?;
    let resolved_output = expand_strict(&step.output, context, step_name)?;
    let positional_filenames = resolve_positional(step_name, step, context)?;

    let cmd_string = build_command_string(
        step_name,
        step,
        context,
        &resolved_inputs,
        &resolved_output,
        &positional_filenames,
        &merged_params,
    )?;

    let hashes = Hashes {
        command: canonical_sha256_hex(&step.rule.command),
        inputs: canonical_sha256_hex(&sorted(&resolved_inputs)),
        params: canonical_sha256_hex(&merged_params),
    };

    Ok(ResolvedCommand {
        step: step_name.to_string(),
        cmd_string,
        input_files: resolved_inputs,
        output: resolved_output,
        hashes,
    })
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut out = values.to_vec();
    out.sort();
    out
}

fn validate_no_late_bound_placeholders(params: &Map<String, Value>, step: &str) -> Result<()> {
    let original = serde_json::to_string(params).unwrap_or_default();
    fn scan(value: &Value, step: &str, original: &str) -> Result<()> {
        match value {
            Value::String(s) => {
                for token in FORBIDDEN_LATE_BOUND {
                    if s.contains(token) {
                        return Err(BuildError::LateBoundInParameters {
                            step: step.to_string(),
                            placeholder: token.to_string(),
                            template: original.to_string(),
                        });
                    }
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    scan(item, step, original)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                for v in map.values() {
                    scan(v, step, original)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
    for v in params.values() {
        scan(v, step, &original)?;
    }
    Ok(())
}

fn rule_defaults(scope: &Map<String, Value>, rule_name: &str) -> Map<String, Value> {
    scope
        .get("PARAMETERS")
        .and_then(Value::as_object)
        .and_then(|rules| rules.get(rule_name))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Merge order (later overrides earlier): rule defaults from `GENERAL`, rule defaults from the
/// active `PROFILE`, then the step-local `PARAMETERS` block.
fn merge_parameters(
    general: &Map<String, Value>,
    profile: &Map<String, Value>,
    rule_name: &str,
    step_params: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = rule_defaults(general, rule_name);
    for (k, v) in rule_defaults(profile, rule_name) {
        merged.insert(k, v);
    }
    for (k, v) in step_params {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn template_map(map: &Map<String, Value>, context: &Map<String, Value>, step: &str) -> Result<Map<String, Value>> {
    let mut out = Map::with_capacity(map.len());
    for (k, v) in map {
        out.insert(k.clone(), deep_template(v, context, step)?);
    }
    Ok(out)
}

fn requires_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{REQUIRES\[(\d+)\]\}$").unwrap())
}

fn resolve_inputs(
    step_name: &str,
    step: &StepConfig,
    context: &Map<String, Value>,
    resolved_outputs: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let mut resolved = Vec::new();
    for template in step.inputs.clone().into_vec() {
        let trimmed = template.trim();
        if let Some(caps) = requires_index_re().captures(trimmed) {
            let idx: usize = caps[1].parse().expect("digits only");
            if idx >= step.requires.len() {
                return Err(BuildError::IndexOutOfRange {
                    step: step_name.to_string(),
                    kind: "REQUIRES",
                    index: idx,
                    len: step.requires.len(),
                });
            }
            let dep = &step.requires[idx];
            let output = resolved_outputs.get(dep).ok_or_else(|| BuildError::UnknownStep(dep.clone()))?;
            resolved.push(output.clone());
            continue;
        }
        if trimmed == "{INPUT_FILES}" {
            if let Some(Value::Array(files)) = context.get("INPUT_FILES") {
                for f in files {
                    resolved.push(value_to_string(f));
                }
            }
            continue;
        }
        match deep_template(&Value::String(template), context, step_name)? {
            Value::Array(items) => {
                for item in items {
                    resolved.push(value_to_string(&item));
                }
            }
            other => resolved.push(value_to_string(&other)),
        }
    }
    Ok(resolved)
}

fn resolve_positional(step_name: &str, step: &StepConfig, context: &Map<String, Value>) -> Result<Vec<String>> {
    let mut resolved = Vec::new();
    for template in step.positional_filenames.clone().into_vec() {
        match deep_template(&Value::String(template), context, step_name)? {
            Value::Array(items) => {
                for item in items {
                    resolved.push(value_to_string(&item));
                }
            }
            other => resolved.push(value_to_string(&other)),
        }
    }
    Ok(resolved)
}

fn indexed_inputs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{INPUTS\[(\d+)\]\}").unwrap())
}

fn substitute_indexed_inputs(template: &str, inputs: &[String], step: &str) -> Result<String> {
    let re = indexed_inputs_re();
    let mut result = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let idx: usize = caps[1].parse().expect("digits only");
        if idx >= inputs.len() {
            return Err(BuildError::IndexOutOfRange {
                step: step.to_string(),
                kind: "INPUTS",
                index: idx,
                len: inputs.len(),
            });
        }
        result.push_str(&template[last..whole.start()]);
        result.push_str(&shell::quote(&inputs[idx]));
        last = whole.end();
    }
    result.push_str(&template[last..]);
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn build_command_string(
    step_name: &str,
    step: &StepConfig,
    context: &Map<String, Value>,
    resolved_inputs: &[String],
    resolved_output: &str,
    positional_filenames: &[String],
    merged_params: &Map<String, Value>,
) -> Result<String> {
    let template = &step.rule.command;

    if !contains_bare_token(template, "OUTPUT") {
        return Err(BuildError::MissingOutputPlaceholder {
            step: step_name.to_string(),
        });
    }
    if !merged_params.is_empty() && !contains_bare_token(template, "PARAMETERS") {
        return Err(BuildError::MissingParametersPlaceholder {
            step: step_name.to_string(),
        });
    }
    if !positional_filenames.is_empty() && !contains_bare_token(template, "POSITIONAL_FILENAMES") {
        return Err(BuildError::MissingPositionalPlaceholder {
            step: step_name.to_string(),
        });
    }

    let bare_inputs = contains_bare_token(template, "INPUTS");
    let has_indexed_inputs = indexed_inputs_re().is_match(template);
    let has_positional = contains_bare_token(template, "POSITIONAL_FILENAMES");
    if !bare_inputs && !has_indexed_inputs && !has_positional {
        tracing::warn!(step = step_name, "command template references none of INPUTS, INPUTS[i], or POSITIONAL_FILENAMES");
    }

    // INPUT_STYLE formatting (positional/switch) only applies when the aggregate `{INPUTS}`
    // token is used; `{INPUTS[i]}`/`{POSITIONAL_FILENAMES}`-only templates get a plain
    // shell-quoted join instead. See DESIGN.md, Open Question resolution 2.
    let inputs_str = if bare_inputs {
        format_inputs_string(resolved_inputs, &step.rule, step_name)?
    } else {
        join_inputs_plain(resolved_inputs)
    };
    let positional_str = format_positional_filenames(positional_filenames, &step.rule);
    let params_str = format_shell_params(merged_params, &step.rule);

    let with_indexed_inputs = substitute_indexed_inputs(template, resolved_inputs, step_name)?;

    let mut final_context = context.clone();
    final_context.insert("OUTPUT".to_string(), Value::String(resolved_output.to_string()));
    final_context.insert("INPUTS".to_string(), Value::String(inputs_str));
    final_context.insert("PARAMETERS".to_string(), Value::String(params_str));
    final_context.insert("POSITIONAL_FILENAMES".to_string(), Value::String(positional_str));

    let expanded = expand_strict(&with_indexed_inputs, &final_context, step_name)?;
    let collapsed = expanded.trim().replace("  ", " ");
    shell::validate(&collapsed, step_name)?;
    Ok(collapsed)
}
