//! Shared handler state

use std::sync::Arc;

use crate::engine::{EngineOptions, TransferEngine};
use crate::history::HistoryQuery;
use crate::identity::IdentityResolver;
use crate::store::Storage;

/// Store, resolver and service handles injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub engine: Arc<TransferEngine>,
    pub history: Arc<HistoryQuery>,
}

impl AppState {
    /// Wire the engine and the history query to one storage backend.
    pub fn new<S>(storage: S, resolver: Arc<dyn IdentityResolver>, options: EngineOptions) -> Self
    where
        S: Storage + Clone + 'static,
    {
        let engine = TransferEngine::new(Arc::new(storage.clone()), Arc::clone(&resolver))
            .with_options(options);
        let history = HistoryQuery::new(Arc::new(storage.clone()), Arc::clone(&resolver));

        Self {
            storage: Arc::new(storage),
            resolver,
            engine: Arc::new(engine),
            history: Arc::new(history),
        }
    }
}
