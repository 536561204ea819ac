//! # Switch Lifecycle
//!
//! The status graph, the state machine that applies it, and the
//! owner-facing operations built on top.

mod errors;
mod lifecycle;
mod machine;
mod state;

pub use errors::{SwitchError, SwitchResult};
pub use lifecycle::{
    owned_switch, validate_email, PlainMessage, SwitchLifecycleManager, SwitchSettings,
    SwitchUpdate,
};
pub use machine::{
    apply_timer_effects, CheckInOutcome, StateMachine, TransitionContext, TransitionOutcome,
    TransitionRejection,
};
pub use state::SwitchStatus;
