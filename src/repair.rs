//! Deadline repair loop.
//!
//! A bounded local fix for one vehicle: find the first late stop, pull it and every
//! other stop at the same address to the front of the route, re-time, look again.
//! Only one late group moves per pass.

use serde::Serialize;
use tracing::debug;

use crate::distance::DistanceMatrix;
use crate::domain::{ParcelArena, ParcelId, Vehicle};
use crate::error::Diagnostics;
use crate::route::simulate;

/// Default pass cap.
pub const DEFAULT_MAX_PASSES: usize = 3;

/// Where the repair loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Clean,
    Repairing { pass: usize },
}

/// How the repair loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairOutcome {
    /// No stop is late. `passes` is the number of moves it took.
    Clean { passes: usize },
    /// The pass cap was hit with these parcels still late, in route order.
    Exhausted { passes: usize, late: Vec<ParcelId> },
}

impl RepairOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RepairOutcome::Clean { .. })
    }
}

/// Index of the first stop delivered after its deadline.
pub fn first_late_stop(vehicle: &Vehicle, parcels: &ParcelArena) -> Option<usize> {
    vehicle
        .route
        .iter()
        .position(|stop| parcels.get(&stop.parcel).is_some_and(|p| p.is_late()))
}

/// Late parcels in route order.
pub fn late_parcels(vehicle: &Vehicle, parcels: &ParcelArena) -> Vec<ParcelId> {
    vehicle
        .route
        .iter()
        .filter(|stop| parcels.get(&stop.parcel).is_some_and(|p| p.is_late()))
        .map(|stop| stop.parcel)
        .collect()
}

/// Moves the stop at `index`, then every other stop at its address in route order,
/// to the front of the route.
///
/// ```
/// use parcel_dispatch::domain::{Stop, Vehicle};
/// use parcel_dispatch::repair::move_group_to_front;
///
/// let mut truck = Vehicle::new(1, 16, 18.0, "Hub");
/// truck.route = vec![Stop::new(1, "A"), Stop::new(2, "B"), Stop::new(3, "C"), Stop::new(4, "B")];
///
/// move_group_to_front(&mut truck, 3);
/// assert_eq!(truck.route_ids(), vec![4, 2, 1, 3]);
/// ```
pub fn move_group_to_front(vehicle: &mut Vehicle, index: usize) {
    if index >= vehicle.route.len() {
        return;
    }
    let late = vehicle.route.remove(index);
    let (mut front, rest): (Vec<_>, Vec<_>) = vehicle
        .route
        .drain(..)
        .partition(|stop| stop.address == late.address);
    front.insert(0, late);
    front.extend(rest);
    vehicle.route = front;
}

/// Runs the repair loop on an already-timed route.
pub fn repair_route(
    vehicle: &mut Vehicle,
    parcels: &mut ParcelArena,
    distances: &DistanceMatrix,
    diagnostics: &mut Diagnostics,
    max_passes: usize,
) -> RepairOutcome {
    let mut state = RepairState::Clean;

    loop {
        let late = first_late_stop(vehicle, parcels);
        state = match (state, late) {
            (RepairState::Clean, None) => return RepairOutcome::Clean { passes: 0 },
            (RepairState::Repairing { pass }, None) => return RepairOutcome::Clean { passes: pass },
            (RepairState::Repairing { pass }, Some(_)) if pass >= max_passes => {
                return RepairOutcome::Exhausted {
                    passes: pass,
                    late: late_parcels(vehicle, parcels),
                };
            }
            (RepairState::Clean, Some(_)) if max_passes == 0 => {
                return RepairOutcome::Exhausted {
                    passes: 0,
                    late: late_parcels(vehicle, parcels),
                };
            }
            (RepairState::Clean, Some(index)) => {
                repair_pass(vehicle, parcels, distances, diagnostics, index, 1);
                RepairState::Repairing { pass: 1 }
            }
            (RepairState::Repairing { pass }, Some(index)) => {
                repair_pass(vehicle, parcels, distances, diagnostics, index, pass + 1);
                RepairState::Repairing { pass: pass + 1 }
            }
        };
    }
}

fn repair_pass(
    vehicle: &mut Vehicle,
    parcels: &mut ParcelArena,
    distances: &DistanceMatrix,
    diagnostics: &mut Diagnostics,
    index: usize,
    pass: usize,
) {
    debug!(
        vehicle = vehicle.id,
        pass,
        parcel = vehicle.route[index].parcel,
        "Moving late stop to front"
    );
    move_group_to_front(vehicle, index);
    simulate(vehicle, parcels, distances, diagnostics);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Parcel, Stop};

    fn setup() -> (Vehicle, ParcelArena, DistanceMatrix) {
        let positions = [0.0, 9.0, 18.0, 3.0];
        let matrix = DistanceMatrix::from_fn(
            ["Hub", "A", "B", "C"].iter().map(|s| s.to_string()).collect(),
            |i, j| f64::abs(positions[i] - positions[j]),
        );
        let parcels: ParcelArena = [(1, "A"), (2, "B"), (3, "C")]
            .into_iter()
            .map(|(id, street)| (id, Parcel::new(id, Address::new(street, "X", "UT", "1"))))
            .collect();
        let mut vehicle = Vehicle::new(1, 16, 18.0, "Hub").with_start_time(8 * 3600);
        vehicle.manifest = vec![1, 2, 3];
        vehicle.route = vec![Stop::new(1, "A"), Stop::new(2, "B"), Stop::new(3, "C")];
        (vehicle, parcels, matrix)
    }

    #[test]
    fn test_clean_route_needs_no_pass() {
        let (mut vehicle, mut parcels, matrix) = setup();
        let mut diagnostics = Diagnostics::new();
        simulate(&mut vehicle, &mut parcels, &matrix, &mut diagnostics);

        let outcome = repair_route(&mut vehicle, &mut parcels, &matrix, &mut diagnostics, DEFAULT_MAX_PASSES);
        assert_eq!(outcome, RepairOutcome::Clean { passes: 0 });
    }

    #[test]
    fn test_late_stop_moves_to_front() {
        let (mut vehicle, mut parcels, matrix) = setup();
        // C is reached at 9:50 along A, B, C; an 8:30 deadline forces it first.
        parcels.get_mut(&3).unwrap().deadline = Some(8 * 3600 + 1800);
        let mut diagnostics = Diagnostics::new();
        simulate(&mut vehicle, &mut parcels, &matrix, &mut diagnostics);

        let outcome = repair_route(&mut vehicle, &mut parcels, &matrix, &mut diagnostics, DEFAULT_MAX_PASSES);

        assert_eq!(outcome, RepairOutcome::Clean { passes: 1 });
        assert_eq!(vehicle.route_ids(), vec![3, 1, 2]);
        assert_eq!(parcels[&3].delivered_at, Some(8 * 3600 + 600));
    }

    #[test]
    fn test_impossible_deadline_exhausts() {
        let (mut vehicle, mut parcels, matrix) = setup();
        // B is 18 away: one hour at best.
        parcels.get_mut(&2).unwrap().deadline = Some(8 * 3600 + 60);
        let mut diagnostics = Diagnostics::new();
        simulate(&mut vehicle, &mut parcels, &matrix, &mut diagnostics);

        let outcome = repair_route(&mut vehicle, &mut parcels, &matrix, &mut diagnostics, DEFAULT_MAX_PASSES);

        assert_eq!(
            outcome,
            RepairOutcome::Exhausted {
                passes: 3,
                late: vec![2]
            }
        );
        assert_eq!(vehicle.route.len(), vehicle.manifest.len());
    }

    #[test]
    fn test_zero_passes_reports_without_moving() {
        let (mut vehicle, mut parcels, matrix) = setup();
        parcels.get_mut(&2).unwrap().deadline = Some(8 * 3600 + 60);
        let mut diagnostics = Diagnostics::new();
        simulate(&mut vehicle, &mut parcels, &matrix, &mut diagnostics);

        let outcome = repair_route(&mut vehicle, &mut parcels, &matrix, &mut diagnostics, 0);

        assert!(!outcome.is_clean());
        assert_eq!(vehicle.route_ids(), vec![1, 2, 3]);
    }
}
