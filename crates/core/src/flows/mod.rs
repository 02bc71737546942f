pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, SsoPromptFlow};
pub use states::{PromptAction, PromptEvent, PromptState, TransitionOutcome};
