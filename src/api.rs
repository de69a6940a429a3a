//! HTTP API for the triage desk

mod handlers;
mod types;

pub use handlers::create_router;

use crate::classifier::ClassifierService;
use crate::db::Database;
use crate::engine::{DatabaseStore, ProductionEngine};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProductionEngine>,
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database, classifier: Arc<dyn ClassifierService>) -> Self {
        Self {
            engine: Arc::new(ProductionEngine::new(DatabaseStore::new(db.clone()), classifier)),
            db,
        }
    }
}
