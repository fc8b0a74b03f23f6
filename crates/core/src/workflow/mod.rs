//! Purchase-request lifecycle: the pure status state machine and the
//! service that loads, applies, persists and notifies.

pub mod engine;
pub mod service;
pub mod states;

pub use engine::StatusStateMachine;
pub use service::{Invocation, WorkflowService};
pub use states::{
    Actor, Transition, TransitionOutcome, WorkflowAction, WorkflowCommand, WorkflowEffect,
};
