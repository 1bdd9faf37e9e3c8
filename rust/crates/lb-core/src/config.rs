//! Workflow configuration: parsing, defaults, and CLI-variable overrides.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BuildError, Result};

/// A value that may appear as a single template string or a list of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// The reusable command template a step binds to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RuleConfig {
    pub name: String,
    pub command: String,
    #[serde(default = "default_dash")]
    pub dash: String,
    #[serde(default)]
    pub input_style: InputStyle,
    #[serde(default)]
    pub input_switch_name: Option<String>,
    #[serde(default = "default_true")]
    pub input_quoted: bool,
    #[serde(default)]
    pub unquoted_params: Vec<String>,
    #[serde(default)]
    pub unquoted_positionals: bool,
}

fn default_dash() -> String {
    "-".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputStyle {
    #[default]
    Positional,
    Switch,
}

/// One named step of the workflow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StepConfig {
    pub rule: RuleConfig,
    #[serde(default)]
    pub inputs: OneOrMany,
    pub output: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub positional_filenames: OneOrMany,
    #[serde(default)]
    pub description: Option<String>,
}

/// The whole workflow configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    #[serde(default)]
    pub general: Map<String, Value>,
    #[serde(default)]
    pub profiles: HashMap<String, Map<String, Value>>,
    #[serde(default)]
    pub profile_groups: HashMap<String, Vec<String>>,
    pub workflow: HashMap<String, StepConfig>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub default_workflow_step: Option<String>,
}

impl Config {
    /// Parse a workflow configuration document and merge CLI variable overrides into `GENERAL`.
    ///
    /// Mirrors the original's `config_data["GENERAL"].update(cli_vars)`: a shallow override, not
    /// a deep merge.
    pub fn from_str(yaml: &str, cli_vars: &HashMap<String, String>) -> Result<Self> {
        let mut config: Config =
            serde_yaml::from_str(yaml).map_err(|e| BuildError::Other(e.into()))?;
        for (k, v) in cli_vars {
            config.general.insert(k.clone(), Value::String(v.clone()));
        }
        config.validate_input_directory()?;
        Ok(config)
    }

    pub fn from_file(path: &Path, cli_vars: &HashMap<String, String>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::Other(e.into()))?;
        Self::from_str(&text, cli_vars)
    }

    fn validate_input_directory(&self) -> Result<()> {
        let Some(dir) = self.general.get("INPUT_DIRECTORY").and_then(Value::as_str) else {
            return Ok(());
        };
        let path = Path::new(dir);
        if !path.exists() {
            return Err(BuildError::InputDirectoryMissing {
                path: path.display().to_string(),
            });
        }
        if !path.is_dir() {
            return Err(BuildError::InputDirectoryNotADirectory {
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    pub fn max_workers(&self) -> usize {
        self.general
            .get("MAX_WORKERS")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }
}
