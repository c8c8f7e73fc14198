//! Shared application state.

use std::sync::Arc;

use cache::WorkflowCache;
use db::Store;
use engine::WorkflowExecutor;
use nodes::StepTransform;

/// Collaborators every handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub transform: Arc<dyn StepTransform>,
    pub cache: WorkflowCache,
    pub executor: WorkflowExecutor,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        transform: Arc<dyn StepTransform>,
        cache: WorkflowCache,
    ) -> Self {
        let executor = WorkflowExecutor::new(store.clone(), transform.clone());
        Self { store, transform, cache, executor }
    }
}
