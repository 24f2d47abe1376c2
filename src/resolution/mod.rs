//! Intent resolution
//!
//! Dependency resolution fills single missing parameters from context; the
//! composer handles the cases where a device and a second entity have to be
//! picked together. `IntentEngine` ties both to normalization and schema
//! validation.

pub mod composer;
pub mod dependencies;
pub mod engine;
pub mod hints;
pub mod outcome;

pub use composer::{Composition, CompositionRequest, IntentComposer};
pub use dependencies::{
    DependencyRegistry, DependencyResolver, ParameterResolver, Resolution, ToolDependency,
};
pub use engine::{IntentEngine, ResolutionRequest};
pub use hints::HintTables;
pub use outcome::{PhaseTracker, ResolutionOutcome, ResolutionPhase, Suggestion};
