//! Iterative safe-missing-key template expansion.
//!
//! A placeholder is `{NAME}` where `NAME` starts with an uppercase letter. Expansion is done in
//! passes: unknown placeholders are left untouched (a "safe" format), which lets a value that
//! itself contains a placeholder (e.g. `BUILD_DIR = "build/{PREVIEW}"`) resolve correctly once
//! `PREVIEW` is filled in on a later pass. A lowercase-led brace, e.g. `{awk_var}`, is never
//! touched — this lets command templates embed shell/awk syntax that happens to use braces.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use lb_core::error::BuildError;
use lb_core::Result;

const MAX_ITERATIONS: usize = 5;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Z][A-Za-z0-9_:,\.&]*)\}").unwrap())
}

fn full_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{([A-Z][A-Za-z0-9_:,\.&]*)\}$").unwrap())
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

/// One safe-missing-key substitution pass: known keys are replaced, unknown ones are left as-is.
fn expand_once(template: &str, context: &Map<String, Value>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match context.get(key) {
                Some(value) => value_to_string(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expands `template` against `context` until a fixed point or `MAX_ITERATIONS`, then requires
/// every remaining uppercase-led placeholder to be gone.
pub fn expand_strict(template: &str, context: &Map<String, Value>, step: &str) -> Result<String> {
    let mut current = template.to_string();
    for _ in 0..MAX_ITERATIONS {
        let next = expand_once(&current, context);
        if next == current {
            break;
        }
        current = next;
    }
    if let Some(caps) = placeholder_re().captures(&current) {
        return Err(BuildError::UnresolvedPlaceholder {
            step: step.to_string(),
            template: template.to_string(),
            placeholder: caps[0].to_string(),
        });
    }
    Ok(current)
}

/// Templates a single string or structured value. When the *entire* trimmed template is exactly
/// one placeholder bound to a non-string context value (a list, object, number, or bool), the
/// underlying value is returned untouched instead of being stringified — this is what lets
/// `INPUTS: "{EXTRA_FILES}"` splice in a whole list rather than its string rendering. Lists and
/// objects recurse element-wise; every other scalar is returned as-is.
pub fn deep_template(value: &Value, context: &Map<String, Value>, step: &str) -> Result<Value> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some(caps) = full_placeholder_re().captures(trimmed) {
                let key = &caps[1];
                if let Some(bound) = context.get(key) {
                    if !matches!(bound, Value::String(_)) {
                        return Ok(bound.clone());
                    }
                }
            }
            Ok(Value::String(expand_strict(s, context, step)?))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(deep_template(item, context, step)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), deep_template(v, context, step)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Checks whether `template` contains the exact bare token `{NAME}` (not `{NAME[0]}` or any
/// other decorated form).
pub fn contains_bare_token(template: &str, name: &str) -> bool {
    let pattern = format!(r"\{{{name}\}}");
    Regex::new(&pattern).map(|re| re.is_match(template)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn resolves_nested_placeholder_over_iterations() {
        let context = ctx(&[
            ("BUILD_DIR", json!("build/{PREVIEW}")),
            ("PREVIEW", json!("v1")),
        ]);
        let out = expand_strict("{BUILD_DIR}/out", &context, "step").unwrap();
        assert_eq!(out, "build/v1/out");
    }

    #[test]
    fn lowercase_braces_survive() {
        let context = ctx(&[("OUTPUT", json!("out.txt"))]);
        let out = expand_strict("awk '{print $1}' > {OUTPUT}", &context, "step").unwrap();
        assert_eq!(out, "awk '{print $1}' > out.txt");
    }

    #[test]
    fn unresolved_uppercase_placeholder_is_an_error() {
        let context = ctx(&[]);
        let err = expand_strict("out/{REGION}.txt", &context, "step").unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn bare_placeholder_splices_list_value() {
        let context = ctx(&[("EXTRA", json!(["a", "b"]))]);
        let out = deep_template(&json!("{EXTRA}"), &context, "step").unwrap();
        assert_eq!(out, json!(["a", "b"]));
    }

    #[test]
    fn contains_bare_token_ignores_indexed_form() {
        assert!(contains_bare_token("cmd {INPUTS}", "INPUTS"));
        assert!(!contains_bare_token("cmd {INPUTS[0]}", "INPUTS"));
    }
}
