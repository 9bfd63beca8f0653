//! Route construction and timing.
//!
//! [`build_route`] orders a vehicle's manifest with a greedy nearest-neighbor tour from
//! the depot; [`simulate`] drives the vehicle along that order at constant speed,
//! stamping each parcel's delivery time and recording where the vehicle was when.

use std::collections::HashMap;

use tracing::debug;

use crate::distance::DistanceMatrix;
use crate::domain::{ParcelArena, ParcelId, Seconds, Stop, Vehicle};
use crate::error::Diagnostics;

/// Seconds needed to cover `distance` at `speed` units per hour.
///
/// Unreachable legs (infinite distance) saturate instead of overflowing.
///
/// ```
/// use parcel_dispatch::route::travel_seconds;
///
/// assert_eq!(travel_seconds(9.0, 18.0), 1800);
/// assert_eq!(travel_seconds(0.0, 18.0), 0);
/// assert_eq!(travel_seconds(f64::INFINITY, 18.0), i64::MAX);
/// ```
pub fn travel_seconds(distance: f64, speed: f64) -> Seconds {
    (distance / speed * 3600.0).round() as Seconds
}

/// Rebuilds `vehicle.route` from its manifest.
///
/// At each step the closest remaining destination wins. Equidistant destinations go to
/// the one scanned last, and one parcel is popped per visit, so parcels sharing an
/// address end up back to back.
pub fn build_route(
    vehicle: &mut Vehicle,
    parcels: &ParcelArena,
    distances: &DistanceMatrix,
    diagnostics: &mut Diagnostics,
) {
    let mut remaining: Vec<String> = Vec::with_capacity(vehicle.manifest.len());
    let mut by_address: HashMap<String, Vec<ParcelId>> = HashMap::new();

    for id in &vehicle.manifest {
        let Some(parcel) = parcels.get(id) else {
            continue;
        };
        let street = parcel.address.street.clone();
        by_address.entry(street.clone()).or_default().push(*id);
        remaining.push(street);
    }

    let mut route = Vec::with_capacity(remaining.len());
    let mut current = vehicle.depot.clone();

    while !remaining.is_empty() {
        let mut nearest = 0;
        let mut min_distance = f64::INFINITY;
        for (index, address) in remaining.iter().enumerate() {
            let distance = distances.distance(&current, address, diagnostics);
            if distance <= min_distance {
                min_distance = distance;
                nearest = index;
            }
        }

        let address = remaining.remove(nearest);
        if let Some(parcel) = by_address.get_mut(&address).and_then(|ids| ids.pop()) {
            route.push(Stop::new(parcel, address.clone()));
        }
        current = address;
    }

    debug!(vehicle = vehicle.id, stops = route.len(), "Route built");
    vehicle.route = route;
}

/// Times the vehicle's current route from its start time.
///
/// Each parcel is delivered on arrival at its stop. The return leg to the depot is
/// included in the total distance and sets the return time. An empty route returns
/// at its start time.
pub fn simulate(
    vehicle: &mut Vehicle,
    parcels: &mut ParcelArena,
    distances: &DistanceMatrix,
    diagnostics: &mut Diagnostics,
) {
    let start = vehicle.start_time;
    let mut location = vehicle.depot.clone();
    let mut travelled = 0.0;
    let mut now = start;

    vehicle.location_log.clear();
    vehicle.location_log.insert(start, location.clone());

    for stop in &vehicle.route {
        travelled += distances.distance(&location, &stop.address, diagnostics);
        now = start.saturating_add(travel_seconds(travelled, vehicle.speed));
        if let Some(parcel) = parcels.get_mut(&stop.parcel) {
            parcel.delivered_at = Some(now);
        }
        vehicle.location_log.insert(now, stop.address.clone());
        location = stop.address.clone();
    }

    vehicle.current_location = location.clone();
    vehicle.current_time = now;

    travelled += distances.distance(&location, &vehicle.depot, diagnostics);
    vehicle.total_distance = travelled;
    vehicle.return_time = Some(start.saturating_add(travel_seconds(travelled, vehicle.speed)));

    debug!(
        vehicle = vehicle.id,
        distance = vehicle.total_distance,
        return_time = vehicle.return_time.unwrap_or(start),
        "Route timed"
    );
}
