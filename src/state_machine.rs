//! Triage session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, PredictionInput};
pub use event::Event;
pub use state::{Phase, SymptomLedger, TriageState};
pub use transition::{transition, TransitionError};
