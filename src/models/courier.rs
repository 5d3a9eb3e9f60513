use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VehicleKind {
    Bicycle,
    Motorbike,
    Car,
    Van,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub username: String,
    /// Unset until the first accepted location update.
    pub position: Option<GeoPoint>,
    pub zone: Option<String>,
    pub available: bool,
    pub vehicle: VehicleKind,
    /// Packages currently bound to this courier; gates the capacity policy.
    pub active_deliveries: u8,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn new(username: String, vehicle: VehicleKind) -> Self {
        let now = Utc::now();
        Self {
            username,
            position: None,
            zone: None,
            available: false,
            vehicle,
            active_deliveries: 0,
            registered_at: now,
            updated_at: now,
        }
    }
}
