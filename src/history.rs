use dashmap::DashMap;

use crate::error::AppError;
use crate::models::location::LocationSample;

/// Append-only location log per tracking number. A log is opened when the
/// package is created and purged when it is archived, so "unknown tracking
/// number" and "known package with no samples yet" stay distinguishable.
pub struct HistoryRecorder {
    logs: DashMap<String, Vec<LocationSample>>,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
        }
    }

    /// Opens an empty log for a freshly created package.
    pub fn open(&self, tracking: &str) {
        self.logs.entry(tracking.to_string()).or_default();
    }

    /// Records an accepted sample. Validation happened upstream; this never
    /// rejects. Appends preserve arrival order, which breaks timestamp ties.
    pub fn append(&self, sample: LocationSample) {
        self.logs
            .entry(sample.tracking_number.clone())
            .or_default()
            .push(sample);
    }

    /// Samples for one package, most recent first by timestamp. `NotFound`
    /// only when the tracking number has no log at all.
    pub fn get_history(&self, tracking: &str) -> Result<Vec<LocationSample>, AppError> {
        let log = self
            .logs
            .get(tracking)
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))?;

        let mut samples: Vec<LocationSample> = log.iter().rev().cloned().collect();
        // Clients may backfill timestamps, so the log is not necessarily
        // sorted. The stable sort over the reversed log keeps the later
        // insertion first among equal timestamps.
        samples.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(samples)
    }

    /// Drops the whole log on package archival.
    pub fn purge(&self, tracking: &str) {
        self.logs.remove(tracking);
    }
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
