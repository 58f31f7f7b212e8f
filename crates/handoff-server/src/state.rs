use crate::idle::ActivityTracker;
use handoff_core::LocalStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalStore>,
    /// Port reported by the identity endpoint
    pub port: u16,
    pub activity: Arc<ActivityTracker>,
}

impl AppState {
    pub fn new(store: Arc<LocalStore>, port: u16) -> Self {
        Self {
            store,
            port,
            activity: Arc::new(ActivityTracker::new()),
        }
    }
}
