use std::sync::Arc;

use crate::broadcast::LocationBroadcaster;
use crate::engine::assignment::{AssignmentConfig, AssignmentEngine};
use crate::history::HistoryRecorder;
use crate::observability::metrics::Metrics;
use crate::packages::PackageStore;
use crate::registry::CourierRegistry;

pub struct AppState {
    pub packages: Arc<PackageStore>,
    pub registry: Arc<CourierRegistry>,
    pub history: Arc<HistoryRecorder>,
    pub broadcaster: LocationBroadcaster,
    pub engine: AssignmentEngine,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, assignment: AssignmentConfig) -> Self {
        let packages = Arc::new(PackageStore::new());
        let registry = Arc::new(CourierRegistry::new());
        let history = Arc::new(HistoryRecorder::new());

        let broadcaster = LocationBroadcaster::new(
            packages.clone(),
            registry.clone(),
            history.clone(),
            event_buffer_size,
        );
        let engine = AssignmentEngine::new(packages.clone(), registry.clone(), assignment);

        Self {
            packages,
            registry,
            history,
            broadcaster,
            engine,
            metrics: Metrics::new(),
        }
    }
}
