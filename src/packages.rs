use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::package::{Package, PackageStatus};

/// Outcome of a status change. `released_courier` is set when the move ends
/// the courier's involvement and their delivery slot should be returned.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub package: Package,
    pub released_courier: Option<String>,
}

/// Owns package records keyed by tracking number and enforces the delivery
/// state machine. Courier binding changes go through `bind`/`unbind` so the
/// status move and the reference update are one atomic step per package.
pub struct PackageStore {
    packages: DashMap<String, Package>,
}

pub struct NewPackage {
    pub pickup_address: String,
    pub delivery_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_zone: Option<String>,
    pub weight_kg: f64,
    pub description: String,
}

impl PackageStore {
    pub fn new() -> Self {
        Self {
            packages: DashMap::new(),
        }
    }

    pub fn create(&self, new: NewPackage) -> Package {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let package = Package {
            id,
            tracking_number: format!("TRK-{}", id.simple()),
            pickup_address: new.pickup_address,
            delivery_address: new.delivery_address,
            pickup: new.pickup,
            dropoff: new.dropoff,
            pickup_zone: new.pickup_zone,
            weight_kg: new.weight_kg,
            description: new.description,
            status: PackageStatus::Created,
            assigned_courier: None,
            created_at: now,
            updated_at: now,
        };

        self.packages
            .insert(package.tracking_number.clone(), package.clone());
        package
    }

    pub fn get(&self, tracking: &str) -> Result<Package, AppError> {
        self.packages
            .get(tracking)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))
    }

    /// Moves a package along the state machine. Illegal moves fail with
    /// `InvalidStateTransition` and leave the record untouched.
    pub fn apply_transition(
        &self,
        tracking: &str,
        to: PackageStatus,
    ) -> Result<TransitionOutcome, AppError> {
        let mut package = self
            .packages
            .get_mut(tracking)
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))?;

        let from = package.status;
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition { from, to });
        }

        let released_courier = if to.is_terminal() {
            package.assigned_courier.clone()
        } else {
            None
        };

        package.status = to;
        package.updated_at = Utc::now();
        if to == PackageStatus::Cancelled {
            package.assigned_courier = None;
        }

        Ok(TransitionOutcome {
            package: package.clone(),
            released_courier,
        })
    }

    /// Atomically moves Created -> Assigned and binds the courier.
    pub fn bind(&self, tracking: &str, courier: &str) -> Result<Package, AppError> {
        let mut package = self
            .packages
            .get_mut(tracking)
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))?;

        let from = package.status;
        if !from.can_transition_to(PackageStatus::Assigned) {
            return Err(AppError::InvalidStateTransition {
                from,
                to: PackageStatus::Assigned,
            });
        }

        package.status = PackageStatus::Assigned;
        package.assigned_courier = Some(courier.to_string());
        package.updated_at = Utc::now();
        Ok(package.clone())
    }

    /// Reverts Assigned -> Created and returns the courier that was bound.
    /// Fails once the package is past pickup, or was never assigned.
    pub fn unbind(&self, tracking: &str) -> Result<(Package, String), AppError> {
        let mut package = self
            .packages
            .get_mut(tracking)
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))?;

        if package.status != PackageStatus::Assigned {
            return Err(AppError::InvalidStateTransition {
                from: package.status,
                to: PackageStatus::Created,
            });
        }

        let courier = package
            .assigned_courier
            .take()
            .ok_or_else(|| AppError::Internal(format!("assigned package {tracking} has no courier")))?;

        package.status = PackageStatus::Created;
        package.updated_at = Utc::now();
        Ok((package.clone(), courier))
    }

    /// Checks that `submitter` may report a position for this package right
    /// now: the package must be in an active state and bound to them.
    pub fn gate_location_update(
        &self,
        tracking: &str,
        submitter: &str,
    ) -> Result<Package, AppError> {
        let package = self.get(tracking)?;

        if !package.status.accepts_location_updates() {
            return Err(AppError::LocationUpdateRejected(format!(
                "package {tracking} is {:?}, not in transit",
                package.status
            )));
        }

        match package.assigned_courier.as_deref() {
            Some(assigned) if assigned == submitter => Ok(package),
            _ => Err(AppError::LocationUpdateRejected(format!(
                "courier {submitter} is not assigned to package {tracking}"
            ))),
        }
    }

    /// Archival removal, only once the package is in a terminal state.
    pub fn remove(&self, tracking: &str) -> Result<Package, AppError> {
        let Some(entry) = self.packages.get(tracking) else {
            return Err(AppError::NotFound(format!("package {tracking} not found")));
        };
        if !entry.status.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "package {tracking} is {:?}, only delivered or cancelled packages can be archived",
                entry.status
            )));
        }
        drop(entry);

        self.packages
            .remove(tracking)
            .map(|(_, package)| package)
            .ok_or_else(|| AppError::NotFound(format!("package {tracking} not found")))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Default for PackageStore {
    fn default() -> Self {
        Self::new()
    }
}
