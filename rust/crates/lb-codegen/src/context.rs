//! Builds the flat template context from `GENERAL` and the active profile.

use std::path::Path;

use serde_json::{Map, Value};

/// Merges `general` and `profile` (profile overrides general), injects `profile_name`, and joins
/// `INPUT_DIRECTORY` onto every `INPUT_FILES` entry when both are present. Computed once per
/// build and reused across every node's command generation.
pub fn build_base_context(
    general: &Map<String, Value>,
    profile_name: &str,
    profile: &Map<String, Value>,
) -> Map<String, Value> {
    let mut ctx = general.clone();
    for (k, v) in profile {
        ctx.insert(k.clone(), v.clone());
    }
    // Lowercase key: never matches the uppercase-led placeholder grammar, so it's inert in
    // templates but available to any collaborator that inspects the context directly.
    ctx.insert("profile_name".to_string(), Value::String(profile_name.to_string()));

    let input_dir = ctx.get("INPUT_DIRECTORY").and_then(Value::as_str).map(str::to_string);
    if let Some(dir) = input_dir {
        if let Some(Value::Array(files)) = ctx.get("INPUT_FILES").cloned() {
            let joined: Vec<Value> = files
                .iter()
                .map(|f| {
                    let name = f.as_str().unwrap_or_default();
                    Value::String(Path::new(&dir).join(name).to_string_lossy().into_owned())
                })
                .collect();
            ctx.insert("INPUT_FILES".to_string(), Value::Array(joined));
        }
    }
    ctx
}
