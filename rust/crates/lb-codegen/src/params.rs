//! Renders the merged parameter map and resolved inputs/positionals into their
//! command-line-flag string forms.

use serde_json::{Map, Value};

use lb_core::config::{InputStyle, RuleConfig};
use lb_core::error::BuildError;
use lb_core::Result;

use crate::shell::quote;

/// Renders `params` as `DASH`-prefixed flags, in the map's key order — `serde_json::Map`
/// preserves insertion order in this workspace, so flags come out in the order the parameters
/// were first defined across `GENERAL`/`PROFILE`/step-local `PARAMETERS`, not alphabetically.
///
/// - absent/`null` values are skipped.
/// - `true` emits the flag alone; `false` is skipped.
/// - a list emits one `flag value` pair per element.
/// - any other scalar emits one `flag value` pair.
///
/// Every emitted value is shell-quoted unless its key is listed in `UNQUOTED_PARAMS`.
pub fn format_shell_params(params: &Map<String, Value>, rule: &RuleConfig) -> String {
    let mut tokens: Vec<String> = Vec::new();
    for (key, value) in params {
        let flag = format!("{}{key}", rule.dash);
        let quoted = !rule.unquoted_params.iter().any(|k| k == key);
        match value {
            Value::Null => {}
            Value::Bool(true) => tokens.push(flag),
            Value::Bool(false) => {}
            Value::Array(items) => {
                for item in items {
                    tokens.push(flag.clone());
                    tokens.push(render_scalar(item, quoted));
                }
            }
            other => {
                tokens.push(flag);
                tokens.push(render_scalar(other, quoted));
            }
        }
    }
    tokens.join(" ")
}

fn render_scalar(value: &Value, quoted: bool) -> String {
    let raw = crate::template::value_to_string(value);
    if quoted {
        quote(&raw)
    } else {
        raw
    }
}

/// Renders resolved input paths per `RULE.INPUT_STYLE`.
pub fn format_inputs_string(inputs: &[String], rule: &RuleConfig, step: &str) -> Result<String> {
    match rule.input_style {
        InputStyle::Positional => Ok(join_quoted(inputs, rule.input_quoted)),
        InputStyle::Switch => {
            let switch_name = rule.input_switch_name.as_deref().ok_or_else(|| {
                BuildError::MissingSwitchName {
                    step: step.to_string(),
                }
            })?;
            let rendered = inputs
                .iter()
                .map(|input| {
                    let value = if rule.input_quoted { quote(input) } else { input.clone() };
                    format!("{switch_name} {value}")
                })
                .collect::<Vec<_>>()
                .join(" ");
            Ok(rendered)
        }
    }
}

/// Space-joined resolved inputs, ignoring `INPUT_STYLE` — used when the command template only
/// references `{INPUTS[i]}` / `{POSITIONAL_FILENAMES}` rather than the aggregate `{INPUTS}`.
pub fn join_inputs_plain(inputs: &[String]) -> String {
    join_quoted(inputs, true)
}

pub fn format_positional_filenames(names: &[String], rule: &RuleConfig) -> String {
    join_quoted(names, !rule.unquoted_positionals)
}

fn join_quoted(values: &[String], quoted: bool) -> String {
    values
        .iter()
        .map(|v| if quoted { quote(v) } else { v.clone() })
        .collect::<Vec<_>>()
        .join(" ")
}
