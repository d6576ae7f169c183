pub mod engine;
pub mod states;

pub use engine::{EmailTurnFlow, TurnDefinition, TurnEngine, TurnTransitionError};
pub use states::{
    SpeechPriority, TransitionOutcome, TurnContext, TurnEffect, TurnEvent, TurnPhase, TurnPolicy,
    TurnState,
};
