//! Error taxonomy for the build orchestrator.

/// Result type alias using [`BuildError`].
pub type Result<T> = std::result::Result<T, BuildError>;

/// All errors the orchestrator can raise, grouped by the stage that raises them.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    // ==========================================================================
    // Config errors — raised at plan time, before any subprocess runs
    // ==========================================================================
    #[error("step '{step}': unknown dependency '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("unknown final step '{0}'")]
    UnknownStep(String),

    #[error("cycle detected among steps: {0}")]
    CycleDetected(String),

    #[error("profile '{name}' not found; available profiles: {available}")]
    UnknownProfile { name: String, available: String },

    #[error("step '{step}': template '{template}' left unresolved placeholder '{placeholder}'")]
    UnresolvedPlaceholder {
        step: String,
        template: String,
        placeholder: String,
    },

    #[error("step '{step}': PARAMETERS may not reference late-bound placeholder '{placeholder}' (template: {template})")]
    LateBoundInParameters {
        step: String,
        placeholder: String,
        template: String,
    },

    #[error("step '{step}': malformed template '{template}': {reason}")]
    MalformedTemplate {
        step: String,
        template: String,
        reason: String,
    },

    #[error("step '{step}': command template must contain {{OUTPUT}}")]
    MissingOutputPlaceholder { step: String },

    #[error("step '{step}': PARAMETERS is non-empty but command template lacks {{PARAMETERS}}")]
    MissingParametersPlaceholder { step: String },

    #[error("step '{step}': POSITIONAL_FILENAMES is non-empty but command template lacks {{POSITIONAL_FILENAMES}}")]
    MissingPositionalPlaceholder { step: String },

    #[error("step '{step}': INPUT_STYLE 'switch' requires INPUT_SWITCH_NAME")]
    MissingSwitchName { step: String },

    #[error("step '{step}': index {index} out of range for {kind} ({len} entries)")]
    IndexOutOfRange {
        step: String,
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("step '{step}': rendered command failed to shell-lex: {command}")]
    ShellLexFailed { step: String, command: String },

    #[error("input directory '{path}' does not exist")]
    InputDirectoryMissing { path: String },

    #[error("input directory path '{path}' is not a directory")]
    InputDirectoryNotADirectory { path: String },

    #[error("step '{step}': {source}")]
    Step {
        step: String,
        #[source]
        source: Box<BuildError>,
    },

    // ==========================================================================
    // State errors
    // ==========================================================================
    #[error("failed to write build state to '{path}': {source}")]
    StateWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Execution errors — recovered at the worker boundary, never propagate raw
    // ==========================================================================
    #[error("step '{step}' exited with status {code}")]
    NonZeroExit { step: String, code: i32 },

    #[error("step '{step}' failed to spawn: {source}")]
    SpawnFailed {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Coarse classification, mirrors the three stages named in the error handling design.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::StateWrite { .. } => "state",
            BuildError::NonZeroExit { .. } | BuildError::SpawnFailed { .. } => "execution",
            _ => "config",
        }
    }
}
