use chrono::Utc;
use dashmap::DashMap;

use crate::error::AppError;
use crate::geo::index::ZoneIndex;
use crate::geo::GeoPoint;
use crate::models::courier::{Courier, VehicleKind};

/// Authoritative availability and location state per courier. All mutation
/// goes through here; the spatial index is updated while the courier's map
/// entry is held, so a snapshot never mixes old and new fields.
pub struct CourierRegistry {
    couriers: DashMap<String, Courier>,
    index: ZoneIndex,
}

impl CourierRegistry {
    pub fn new() -> Self {
        Self {
            couriers: DashMap::new(),
            index: ZoneIndex::new(),
        }
    }

    pub fn register(&self, username: &str, vehicle: VehicleKind) -> Result<Courier, AppError> {
        if self.couriers.contains_key(username) {
            return Err(AppError::BadRequest(format!(
                "courier {username} already registered"
            )));
        }

        let courier = Courier::new(username.to_string(), vehicle);
        self.couriers.insert(username.to_string(), courier.clone());
        Ok(courier)
    }

    pub fn get(&self, username: &str) -> Result<Courier, AppError> {
        self.couriers
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {username} not found")))
    }

    pub fn set_available(&self, username: &str, available: bool) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(username)
            .ok_or_else(|| AppError::NotFound(format!("courier {username} not found")))?;

        courier.available = available;
        courier.updated_at = Utc::now();
        Ok(courier.clone())
    }

    /// Applies a position report and returns the new snapshot. The index
    /// update happens under the courier's entry lock, so concurrent updates
    /// for the same courier serialize and never interleave.
    pub fn update_location(
        &self,
        username: &str,
        point: GeoPoint,
        zone: Option<String>,
    ) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(username)
            .ok_or_else(|| AppError::NotFound(format!("courier {username} not found")))?;

        courier.position = Some(point);
        courier.zone = zone;
        courier.updated_at = Utc::now();
        self.index.upsert(username, point, courier.zone.as_deref());

        Ok(courier.clone())
    }

    /// Available couriers within `radius_m` of `center`, ascending by
    /// distance. Couriers without a position yet never match.
    pub fn find_available_nearby(&self, center: &GeoPoint, radius_m: f64) -> Vec<(Courier, f64)> {
        let mut matches: Vec<(Courier, f64)> = self
            .index
            .within_radius(center, radius_m)
            .into_iter()
            .filter_map(|(username, distance)| {
                let entry = self.couriers.get(&username)?;
                let courier = entry.value();
                courier.available.then(|| (courier.clone(), distance))
            })
            .collect();

        matches.sort_by(|a, b| a.1.total_cmp(&b.1));
        matches
    }

    pub fn find_available_in_zone(&self, zone: &str) -> Vec<Courier> {
        self.index
            .in_zone(zone)
            .into_iter()
            .filter_map(|username| {
                let entry = self.couriers.get(&username)?;
                let courier = entry.value();
                courier.available.then(|| courier.clone())
            })
            .collect()
    }

    /// Claims one delivery slot. Check and increment happen under the entry
    /// lock, so concurrent assignments cannot push a courier past capacity.
    pub fn try_reserve(&self, username: &str, max_concurrent: u8) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(username)
            .ok_or_else(|| AppError::NotFound(format!("courier {username} not found")))?;

        if courier.active_deliveries >= max_concurrent {
            return Err(AppError::CapacityExceeded(format!(
                "courier {username} already at {max_concurrent} active deliveries"
            )));
        }

        courier.active_deliveries += 1;
        courier.updated_at = Utc::now();
        Ok(())
    }

    /// Returns a delivery slot. No-op for unknown couriers.
    pub fn release(&self, username: &str) {
        if let Some(mut courier) = self.couriers.get_mut(username) {
            courier.active_deliveries = courier.active_deliveries.saturating_sub(1);
            courier.updated_at = Utc::now();
        }
    }

    pub fn list(&self) -> Vec<Courier> {
        self.couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.couriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.couriers.is_empty()
    }
}

impl Default for CourierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
