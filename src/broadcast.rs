use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::history::HistoryRecorder;
use crate::models::location::{Ack, LocationSample, TrackingEvent};
use crate::models::package::PackageStatus;
use crate::packages::PackageStore;
use crate::registry::CourierRegistry;

/// A broadcast channel name: either a package's public tracking feed or a
/// user's private channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Package(String),
    User(String),
}

impl Topic {
    /// Parses the wire form `package:<tracking>` / `user:<username>`.
    pub fn parse(raw: &str) -> Option<Topic> {
        match raw.split_once(':') {
            Some(("package", tracking)) if !tracking.is_empty() => {
                Some(Topic::Package(tracking.to_string()))
            }
            Some(("user", username)) if !username.is_empty() => {
                Some(Topic::User(username.to_string()))
            }
            _ => None,
        }
    }
}

/// Fan-out hub for location and status events, and the validated ingestion
/// pipeline for courier position reports. One tokio broadcast channel per
/// topic: a slow or dropped subscriber lags on its own receiver and never
/// blocks the rest.
pub struct LocationBroadcaster {
    packages: Arc<PackageStore>,
    registry: Arc<CourierRegistry>,
    history: Arc<HistoryRecorder>,
    topics: DashMap<Topic, broadcast::Sender<TrackingEvent>>,
    buffer: usize,
}

impl LocationBroadcaster {
    pub fn new(
        packages: Arc<PackageStore>,
        registry: Arc<CourierRegistry>,
        history: Arc<HistoryRecorder>,
        buffer: usize,
    ) -> Self {
        Self {
            packages,
            registry,
            history,
            topics: DashMap::new(),
            buffer,
        }
    }

    /// Joins a topic. The returned receiver is the subscription handle:
    /// dropping it is the unsubscribe, and empty topics are swept out of the
    /// registry on the next publish.
    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<TrackingEvent> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    fn publish(&self, topic: &Topic, event: TrackingEvent) {
        self.sweep();
        if let Some(sender) = self.topics.get(topic) {
            // send only errors when nobody is listening.
            let _ = sender.send(event);
        }
    }

    /// Drops topics whose last receiver disconnected, so abandoned
    /// subscriptions cannot grow the registry without bound.
    fn sweep(&self) {
        self.topics
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Validated ingestion of one courier position report. On acceptance the
    /// registry and history are updated and the sample goes out on the
    /// package topic plus a success ack on the submitter's private channel.
    /// On rejection only the private channel hears about it.
    pub fn publish_location(
        &self,
        tracking: &str,
        submitter: &str,
        point: GeoPoint,
        zone: Option<String>,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<LocationSample, AppError> {
        let outcome = self
            .packages
            .gate_location_update(tracking, submitter)
            .and_then(|_| self.registry.update_location(submitter, point, zone));

        let courier = match outcome {
            Ok(courier) => courier,
            Err(err) => {
                self.publish(
                    &Topic::User(submitter.to_string()),
                    TrackingEvent::Ack(Ack::error(err.to_string())),
                );
                return Err(err);
            }
        };

        let sample = LocationSample {
            tracking_number: tracking.to_string(),
            courier: submitter.to_string(),
            position: point,
            zone: courier.zone,
            recorded_at: recorded_at.unwrap_or_else(Utc::now),
        };

        self.history.append(sample.clone());
        self.publish(
            &Topic::Package(tracking.to_string()),
            TrackingEvent::Location(sample.clone()),
        );
        self.publish(
            &Topic::User(submitter.to_string()),
            TrackingEvent::Ack(Ack::success(format!("location recorded for {tracking}"))),
        );

        debug!(tracking, courier = submitter, "location update accepted");
        Ok(sample)
    }

    /// Announces a status change on the package's public topic.
    pub fn publish_status(&self, tracking: &str, status: PackageStatus) {
        self.publish(
            &Topic::Package(tracking.to_string()),
            TrackingEvent::Status {
                tracking_number: tracking.to_string(),
                status,
                changed_at: Utc::now(),
            },
        );
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.topics
            .iter()
            .map(|entry| entry.value().receiver_count())
            .sum()
    }
}
