use std::collections::HashSet;

use dashmap::DashMap;

use crate::geo::{haversine_m, GeoPoint};

/// Grid cell edge in degrees, roughly 5.5 km of latitude. Coarse enough that
/// a city fits in a handful of cells, fine enough that radius queries skip
/// most of the fleet.
const CELL_DEG: f64 = 0.05;

const METERS_PER_DEG_LAT: f64 = 111_320.0;

type Cell = (i64, i64);

fn cell_of(point: &GeoPoint) -> Cell {
    (
        (point.lat / CELL_DEG).floor() as i64,
        (point.lng / CELL_DEG).floor() as i64,
    )
}

/// In-memory spatial index of courier positions. Positions are bucketed into
/// lat/lng grid cells so `within_radius` only scans the cells the radius can
/// reach; zone labels get their own buckets for `in_zone`.
pub struct ZoneIndex {
    positions: DashMap<String, GeoPoint>,
    cells: DashMap<Cell, HashSet<String>>,
    zones: DashMap<String, HashSet<String>>,
}

impl ZoneIndex {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            cells: DashMap::new(),
            zones: DashMap::new(),
        }
    }

    /// Inserts or moves a courier. Unknown ids are created.
    pub fn upsert(&self, courier: &str, point: GeoPoint, zone: Option<&str>) {
        self.detach(courier);

        self.positions.insert(courier.to_string(), point);
        self.cells
            .entry(cell_of(&point))
            .or_default()
            .insert(courier.to_string());

        if let Some(zone) = zone {
            self.zones
                .entry(zone.to_string())
                .or_default()
                .insert(courier.to_string());
        }
    }

    /// Removes a courier from the index. No-op on unknown id.
    pub fn remove(&self, courier: &str) {
        self.detach(courier);
        self.positions.remove(courier);
    }

    fn detach(&self, courier: &str) {
        if let Some(previous) = self.positions.get(courier).map(|p| *p) {
            if let Some(mut members) = self.cells.get_mut(&cell_of(&previous)) {
                members.remove(courier);
            }
        }
        self.zones.retain(|_, members| {
            members.remove(courier);
            !members.is_empty()
        });
    }

    /// Couriers within `radius_m` of `center` (inclusive), with their
    /// distance in meters. Unordered.
    pub fn within_radius(&self, center: &GeoPoint, radius_m: f64) -> Vec<(String, f64)> {
        let lat_span = ((radius_m / METERS_PER_DEG_LAT) / CELL_DEG).ceil() as i64;
        let lng_scale = center.lat.to_radians().cos().abs().max(0.01);
        let lng_span = ((radius_m / (METERS_PER_DEG_LAT * lng_scale)) / CELL_DEG).ceil() as i64;

        let (center_row, center_col) = cell_of(center);
        let mut hits = Vec::new();

        for row in (center_row - lat_span)..=(center_row + lat_span) {
            for col in (center_col - lng_span)..=(center_col + lng_span) {
                let Some(members) = self.cells.get(&(row, col)) else {
                    continue;
                };
                for courier in members.iter() {
                    let Some(position) = self.positions.get(courier) else {
                        continue;
                    };
                    let distance = haversine_m(center, &position);
                    if distance <= radius_m {
                        hits.push((courier.clone(), distance));
                    }
                }
            }
        }

        hits
    }

    /// Couriers currently labelled with `zone`.
    pub fn in_zone(&self, zone: &str) -> Vec<String> {
        self.zones
            .get(zone)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn position(&self, courier: &str) -> Option<GeoPoint> {
        self.positions.get(courier).map(|p| *p)
    }
}

impl Default for ZoneIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::ZoneIndex;
    use crate::geo::GeoPoint;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn within_radius_is_inclusive_and_filters_far_couriers() {
        let index = ZoneIndex::new();
        index.upsert("near", point(52.5200, 13.4050), None);
        index.upsert("far", point(52.6200, 13.4050), None);

        let hits = index.within_radius(&point(52.5201, 13.4050), 500.0);
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(ids, vec!["near"]);
        assert!(hits[0].1 <= 500.0);
    }

    #[test]
    fn radius_query_crosses_cell_boundaries() {
        let index = ZoneIndex::new();
        // 0.05-degree cells: these two straddle a boundary ~1.1 km apart.
        index.upsert("a", point(52.549, 13.405), None);
        index.upsert("b", point(52.551, 13.405), None);

        let hits = index.within_radius(&point(52.550, 13.405), 2_000.0);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn upsert_moves_courier_between_cells_and_zones() {
        let index = ZoneIndex::new();
        index.upsert("x", point(52.52, 13.40), Some("mitte"));
        index.upsert("x", point(48.85, 2.35), Some("marais"));

        assert!(index.in_zone("mitte").is_empty());
        assert_eq!(index.in_zone("marais"), vec!["x".to_string()]);

        let near_old = index.within_radius(&point(52.52, 13.40), 1_000.0);
        assert!(near_old.is_empty());
    }

    #[test]
    fn remove_unknown_courier_is_a_noop() {
        let index = ZoneIndex::new();
        index.remove("ghost");
        assert!(index.position("ghost").is_none());
    }

    #[test]
    fn remove_clears_zone_membership() {
        let index = ZoneIndex::new();
        index.upsert("x", point(1.0, 1.0), Some("a"));
        index.remove("x");

        assert!(index.in_zone("a").is_empty());
        assert!(index.within_radius(&point(1.0, 1.0), 10_000.0).is_empty());
    }
}
