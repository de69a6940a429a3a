//! Triage session engine
//!
//! Owns the session lifecycle: loads stored state, runs the state machine,
//! talks to the classifier and commits each turn atomically.

mod error;
mod executor;
mod response;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use error::TriageError;
pub use executor::TriageEngine;
pub use response::TurnResponse;
pub use traits::*;

use crate::classifier::ClassifierService;
use std::sync::Arc;

/// Type alias for the production engine with concrete implementations
pub type ProductionEngine = TriageEngine<DatabaseStore, Arc<dyn ClassifierService>>;
