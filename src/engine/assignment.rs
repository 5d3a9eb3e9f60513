use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::package::{Package, PackageStatus};
use crate::packages::PackageStore;
use crate::registry::CourierRegistry;

#[derive(Debug, Clone)]
pub struct AssignmentConfig {
    /// Widest pickup-to-courier distance considered for a match.
    pub max_radius_m: f64,
    /// Couriers at this many active deliveries leave the candidate set.
    pub max_concurrent_deliveries: u8,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_radius_m: 5_000.0,
            max_concurrent_deliveries: 1,
        }
    }
}

/// Matches packages to couriers and owns the courier-binding side effects of
/// status changes. Candidate ordering: pickup-zone match beats raw distance,
/// then ascending distance, then earliest registration for a stable result.
pub struct AssignmentEngine {
    packages: Arc<PackageStore>,
    registry: Arc<CourierRegistry>,
    config: AssignmentConfig,
}

impl AssignmentEngine {
    pub fn new(
        packages: Arc<PackageStore>,
        registry: Arc<CourierRegistry>,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            packages,
            registry,
            config,
        }
    }

    pub fn assign(&self, tracking: &str) -> Result<Courier, AppError> {
        let package = self.packages.get(tracking)?;
        if package.status != PackageStatus::Created {
            return Err(AppError::InvalidStateTransition {
                from: package.status,
                to: PackageStatus::Assigned,
            });
        }

        let mut candidates = self
            .registry
            .find_available_nearby(&package.pickup, self.config.max_radius_m);
        candidates
            .retain(|(courier, _)| courier.active_deliveries < self.config.max_concurrent_deliveries);

        if candidates.is_empty() {
            warn!(tracking, "no eligible couriers for assignment");
            return Err(AppError::NoCourierAvailable);
        }

        let pickup_zone = package.pickup_zone.as_deref();
        candidates
            .sort_by(|(a, dist_a), (b, dist_b)| compare_candidates(pickup_zone, (a, *dist_a), (b, *dist_b)));

        // The candidate snapshot is stale by the time we commit, so claim a
        // capacity slot per candidate and fall through to the next one when a
        // concurrent assignment won the race.
        for (candidate, distance_m) in candidates {
            match self
                .registry
                .try_reserve(&candidate.username, self.config.max_concurrent_deliveries)
            {
                Ok(()) => {}
                Err(AppError::CapacityExceeded(_)) => continue,
                Err(err) => return Err(err),
            }

            return match self.packages.bind(tracking, &candidate.username) {
                Ok(_) => {
                    info!(
                        tracking,
                        courier = %candidate.username,
                        distance_m,
                        "package assigned"
                    );
                    self.registry.get(&candidate.username)
                }
                Err(err) => {
                    self.registry.release(&candidate.username);
                    Err(err)
                }
            };
        }

        Err(AppError::NoCourierAvailable)
    }

    /// Reverts an assignment that has not reached pickup and frees the
    /// courier's slot.
    pub fn unassign(&self, tracking: &str) -> Result<Package, AppError> {
        let (package, courier) = self.packages.unbind(tracking)?;
        self.registry.release(&courier);
        info!(tracking, courier = %courier, "package unassigned");
        Ok(package)
    }

    /// Courier-driven life-cycle progression. Forward moves require the
    /// acting courier to be the assigned one; cancellation does not.
    /// Terminal moves hand the courier's delivery slot back.
    pub fn update_status(
        &self,
        tracking: &str,
        to: PackageStatus,
        actor: &str,
    ) -> Result<Package, AppError> {
        if to == PackageStatus::Assigned || to == PackageStatus::Created {
            return Err(AppError::BadRequest(format!(
                "{to:?} is set through assign/unassign, not a status update"
            )));
        }

        if to != PackageStatus::Cancelled {
            let package = self.packages.get(tracking)?;
            match package.assigned_courier.as_deref() {
                Some(assigned) if assigned == actor => {}
                _ => {
                    return Err(AppError::LocationUpdateRejected(format!(
                        "courier {actor} is not assigned to package {tracking}"
                    )))
                }
            }
        }

        let outcome = self.packages.apply_transition(tracking, to)?;
        if let Some(courier) = &outcome.released_courier {
            self.registry.release(courier);
        }

        info!(tracking, status = ?to, "package status updated");
        Ok(outcome.package)
    }
}

fn compare_candidates(pickup_zone: Option<&str>, a: (&Courier, f64), b: (&Courier, f64)) -> Ordering {
    let a_in_zone = pickup_zone.is_some() && a.0.zone.as_deref() == pickup_zone;
    let b_in_zone = pickup_zone.is_some() && b.0.zone.as_deref() == pickup_zone;
    b_in_zone
        .cmp(&a_in_zone)
        .then(a.1.total_cmp(&b.1))
        .then_with(|| a.0.registered_at.cmp(&b.0.registered_at))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AssignmentConfig, AssignmentEngine};
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::courier::VehicleKind;
    use crate::models::package::PackageStatus;
    use crate::packages::{NewPackage, PackageStore};
    use crate::registry::CourierRegistry;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    fn engine(config: AssignmentConfig) -> (Arc<PackageStore>, Arc<CourierRegistry>, AssignmentEngine) {
        let packages = Arc::new(PackageStore::new());
        let registry = Arc::new(CourierRegistry::new());
        let engine = AssignmentEngine::new(packages.clone(), registry.clone(), config);
        (packages, registry, engine)
    }

    fn add_courier(registry: &CourierRegistry, username: &str, at: GeoPoint, zone: Option<&str>) {
        registry.register(username, VehicleKind::Bicycle).unwrap();
        registry.set_available(username, true).unwrap();
        registry
            .update_location(username, at, zone.map(String::from))
            .unwrap();
    }

    fn add_package(packages: &PackageStore, pickup: GeoPoint, zone: Option<&str>) -> String {
        packages
            .create(NewPackage {
                pickup_address: "pickup".to_string(),
                delivery_address: "dropoff".to_string(),
                pickup,
                dropoff: point(pickup.lat + 0.01, pickup.lng + 0.01),
                pickup_zone: zone.map(String::from),
                weight_kg: 1.0,
                description: "parcel".to_string(),
            })
            .tracking_number
    }

    #[test]
    fn assign_picks_nearest_available_courier() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "near", point(52.5205, 13.4050), None);
        add_courier(&registry, "far", point(52.5400, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);

        let courier = engine.assign(&tracking).unwrap();
        assert_eq!(courier.username, "near");

        let package = packages.get(&tracking).unwrap();
        assert_eq!(package.status, PackageStatus::Assigned);
        assert_eq!(package.assigned_courier.as_deref(), Some("near"));
    }

    #[test]
    fn zone_match_beats_raw_distance() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        // Y is ~10m away but in the wrong zone; X is ~50m away in zone A.
        add_courier(&registry, "x", point(1.00045, 1.0), Some("a"));
        add_courier(&registry, "y", point(1.00009, 1.0), Some("b"));
        let tracking = add_package(&packages, point(1.0, 1.0), Some("a"));

        let courier = engine.assign(&tracking).unwrap();
        assert_eq!(courier.username, "x");
        assert_eq!(
            packages.get(&tracking).unwrap().status,
            PackageStatus::Assigned
        );
    }

    #[test]
    fn no_candidates_leaves_package_created() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        // Only courier is out of radius.
        add_courier(&registry, "remote", point(53.5, 10.0), None);
        let tracking = add_package(&packages, point(52.52, 13.40), None);

        let err = engine.assign(&tracking).unwrap_err();
        assert!(matches!(err, AppError::NoCourierAvailable));
        assert_eq!(
            packages.get(&tracking).unwrap().status,
            PackageStatus::Created
        );
    }

    #[test]
    fn unavailable_couriers_are_not_candidates() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "off", point(52.5201, 13.4050), None);
        registry.set_available("off", false).unwrap();
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);

        assert!(matches!(
            engine.assign(&tracking),
            Err(AppError::NoCourierAvailable)
        ));
    }

    #[test]
    fn courier_at_capacity_is_skipped() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "solo", point(52.5201, 13.4050), None);
        add_courier(&registry, "backup", point(52.5210, 13.4050), None);

        let first = add_package(&packages, point(52.5200, 13.4050), None);
        let second = add_package(&packages, point(52.5200, 13.4050), None);

        assert_eq!(engine.assign(&first).unwrap().username, "solo");
        // Default capacity is one: the nearer courier is full now.
        assert_eq!(engine.assign(&second).unwrap().username, "backup");
    }

    #[test]
    fn capacity_config_allows_multiple_deliveries() {
        let (packages, registry, engine) = engine(AssignmentConfig {
            max_concurrent_deliveries: 2,
            ..AssignmentConfig::default()
        });
        add_courier(&registry, "solo", point(52.5201, 13.4050), None);

        let first = add_package(&packages, point(52.5200, 13.4050), None);
        let second = add_package(&packages, point(52.5200, 13.4050), None);
        let third = add_package(&packages, point(52.5200, 13.4050), None);

        assert_eq!(engine.assign(&first).unwrap().username, "solo");
        assert_eq!(engine.assign(&second).unwrap().username, "solo");
        assert!(matches!(
            engine.assign(&third),
            Err(AppError::NoCourierAvailable)
        ));
    }

    #[test]
    fn assign_twice_fails_with_invalid_transition() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "amy", point(52.5201, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);

        engine.assign(&tracking).unwrap();
        let err = engine.assign(&tracking).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidStateTransition {
                from: PackageStatus::Assigned,
                to: PackageStatus::Assigned,
            }
        ));
    }

    #[test]
    fn unassign_frees_the_capacity_slot() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "amy", point(52.5201, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);

        engine.assign(&tracking).unwrap();
        assert_eq!(registry.get("amy").unwrap().active_deliveries, 1);

        let package = engine.unassign(&tracking).unwrap();
        assert_eq!(package.status, PackageStatus::Created);
        assert_eq!(registry.get("amy").unwrap().active_deliveries, 0);

        // Second unassign has nothing to revert.
        let err = engine.unassign(&tracking).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition { .. }));
        assert_eq!(registry.get("amy").unwrap().active_deliveries, 0);
    }

    #[test]
    fn only_assigned_courier_may_progress_status() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "amy", point(52.5201, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);
        engine.assign(&tracking).unwrap();

        let err = engine
            .update_status(&tracking, PackageStatus::PickedUp, "zed")
            .unwrap_err();
        assert!(matches!(err, AppError::LocationUpdateRejected(_)));

        let package = engine
            .update_status(&tracking, PackageStatus::PickedUp, "amy")
            .unwrap();
        assert_eq!(package.status, PackageStatus::PickedUp);
    }

    #[test]
    fn delivery_releases_the_courier() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "amy", point(52.5201, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);

        engine.assign(&tracking).unwrap();
        engine
            .update_status(&tracking, PackageStatus::PickedUp, "amy")
            .unwrap();
        engine
            .update_status(&tracking, PackageStatus::InTransit, "amy")
            .unwrap();
        let package = engine
            .update_status(&tracking, PackageStatus::Delivered, "amy")
            .unwrap();

        assert_eq!(package.status, PackageStatus::Delivered);
        assert_eq!(package.assigned_courier.as_deref(), Some("amy"));
        assert_eq!(registry.get("amy").unwrap().active_deliveries, 0);
    }

    #[test]
    fn cancel_after_assignment_clears_binding_and_slot() {
        let (packages, registry, engine) = engine(AssignmentConfig::default());
        add_courier(&registry, "amy", point(52.5201, 13.4050), None);
        let tracking = add_package(&packages, point(52.5200, 13.4050), None);
        engine.assign(&tracking).unwrap();

        let package = engine
            .update_status(&tracking, PackageStatus::Cancelled, "dispatcher")
            .unwrap();
        assert_eq!(package.status, PackageStatus::Cancelled);
        assert!(package.assigned_courier.is_none());
        assert_eq!(registry.get("amy").unwrap().active_deliveries, 0);
    }
}
