use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Delivery life-cycle. Forward path is
/// Created -> Assigned -> PickedUp -> InTransit -> Delivered;
/// Cancelled is reachable up to and including PickedUp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    Created,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl PackageStatus {
    pub fn can_transition_to(self, to: PackageStatus) -> bool {
        use PackageStatus::*;
        matches!(
            (self, to),
            (Created, Assigned)
                | (Created, Cancelled)
                | (Assigned, PickedUp)
                | (Assigned, Cancelled)
                | (PickedUp, InTransit)
                | (PickedUp, Cancelled)
                | (InTransit, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PackageStatus::Delivered | PackageStatus::Cancelled)
    }

    /// States in which the assigned courier may submit location updates.
    pub fn accepts_location_updates(self) -> bool {
        matches!(
            self,
            PackageStatus::Assigned | PackageStatus::PickedUp | PackageStatus::InTransit
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    /// Externally visible identifier, immutable once issued.
    pub tracking_number: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_zone: Option<String>,
    pub weight_kg: f64,
    pub description: String,
    pub status: PackageStatus,
    pub assigned_courier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::PackageStatus::*;

    #[test]
    fn forward_path_is_allowed() {
        assert!(Created.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!Created.can_transition_to(PickedUp));
        assert!(!Created.can_transition_to(InTransit));
        assert!(!Created.can_transition_to(Delivered));
        assert!(!Assigned.can_transition_to(InTransit));
        assert!(!Assigned.can_transition_to(Delivered));
        assert!(!PickedUp.can_transition_to(Delivered));
    }

    #[test]
    fn cancel_window_closes_after_pickup() {
        assert!(Created.can_transition_to(Cancelled));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(PickedUp.can_transition_to(Cancelled));
        assert!(!InTransit.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [Created, Assigned, PickedUp, InTransit, Delivered, Cancelled] {
            assert!(!Delivered.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn location_updates_only_in_active_states() {
        assert!(!Created.accepts_location_updates());
        assert!(Assigned.accepts_location_updates());
        assert!(PickedUp.accepts_location_updates());
        assert!(InTransit.accepts_location_updates());
        assert!(!Delivered.accepts_location_updates());
        assert!(!Cancelled.accepts_location_updates());
    }
}
