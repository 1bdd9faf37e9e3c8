pub mod engine;
pub mod executor;
pub mod planner;
pub mod reporter;
pub mod state;

pub use engine::Engine;
pub use executor::{Executor, StatusCallback};
pub use planner::{BuildPlan, BuildStep, Planner, UpdateCode};
pub use reporter::describe_workflow;
pub use state::{BuildState, StateManager, StoredHashes, StoredStepState};
