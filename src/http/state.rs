use crate::annunciator::Annunciator;
use std::sync::Arc;

/// Shared state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub annunciator: Arc<Annunciator>,
}

impl AppState {
    pub fn new(annunciator: Arc<Annunciator>) -> Self {
        Self { annunciator }
    }
}
