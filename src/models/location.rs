use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::package::PackageStatus;

/// One accepted position report. Immutable once recorded; ordering within a
/// package's history is recorded_at, ties broken by insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub tracking_number: String,
    pub courier: String,
    pub position: GeoPoint,
    pub zone: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    Error,
}

/// Private-channel acknowledgment for a submitted update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    pub message: String,
}

impl Ack {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
        }
    }
}

/// Everything that flows over a broadcast topic. Public package topics carry
/// `Location` and `Status`; private user channels carry `Ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    Location(LocationSample),
    Status {
        tracking_number: String,
        status: PackageStatus,
        changed_at: DateTime<Utc>,
    },
    Ack(Ack),
}
