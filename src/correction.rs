//! Late information and point-in-time queries.
//!
//! Held parcels wait for a corrected destination. Once the query time reaches a
//! parcel's `delayedUntil`, [`apply_corrections`] rewrites its address, releases it
//! from hold and appends it to the route of the vehicle carrying its co-delivery group,
//! or else the correction vehicle. Each parcel is corrected at most once.
//!
//! Status queries always apply due corrections first, then read the timing log.

use serde::Serialize;
use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::domain::{
    format_time_of_day, Address, ConstraintKind, Parcel, ParcelId, ParcelStatus, Seconds, Stop, Vehicle, VehicleId,
};
use crate::error::{Diagnostic, DispatchError};
use crate::planner::PlanContext;
use crate::route::simulate;

/// Location label for parcels in the hold compartment.
pub const HOLD_LOCATION: &str = "Hold compartment";

/// Applies every correction due at `now`. Returns the parcels corrected by this call.
pub fn apply_corrections(ctx: &mut PlanContext, now: Seconds) -> Vec<ParcelId> {
    let due: Vec<ParcelId> = ctx
        .pending_corrections
        .iter()
        .copied()
        .filter(|id| {
            ctx.parcels
                .get(id)
                .and_then(|p| p.delayed_until())
                .is_some_and(|until| until <= now)
        })
        .collect();
    if due.is_empty() {
        return due;
    }

    let target = ctx.config.correction.target_vehicle;
    let address = ctx.config.correction.address.clone();

    let mut touched = BTreeSet::new();
    for id in &due {
        ctx.pending_corrections.remove(id);
        touched.extend(correct_parcel(ctx, *id, &address, target));
    }

    for id in &touched {
        if let Some(vehicle) = ctx.fleet.vehicle_mut(*id) {
            simulate(vehicle, &mut ctx.parcels, &ctx.distances, &mut ctx.diagnostics);
        }
    }

    info!(
        time = %format_time_of_day(now),
        corrected = ?due,
        vehicles = ?touched,
        "Corrections applied"
    );
    due
}

/// Vehicle already carrying a co-delivery sibling of `id`, lowest sibling id first.
fn group_vehicle(ctx: &PlanContext, id: ParcelId) -> Option<VehicleId> {
    ctx.parcels
        .get(&id)?
        .deliver_with()
        .iter()
        .find_map(|sibling| ctx.parcels.get(sibling).and_then(|p| p.vehicle()))
}

/// Rewrites `id`'s address and loads it, preferring the vehicle of its co-delivery
/// group over `target`. Returns the vehicle that took it.
fn correct_parcel(ctx: &mut PlanContext, id: ParcelId, address: &Address, target: VehicleId) -> Option<VehicleId> {
    if let Some(parcel) = ctx.parcels.get_mut(&id) {
        parcel.address = address.clone();
        parcel.remove_constraint(ConstraintKind::Flagged);
    }
    ctx.release(id);

    let joined = group_vehicle(ctx, id);
    let Some(vehicle) = ctx.load_first(id, joined.into_iter().chain([target])) else {
        ctx.hold(id);
        ctx.diagnostics.push(Diagnostic::CorrectionUnplaced {
            parcel: id,
            vehicle: joined.unwrap_or(target),
        });
        return None;
    };

    if let Some(group_vehicle) = joined.filter(|v| *v != vehicle) {
        ctx.diagnostics.push(Diagnostic::CoDeliverySplit {
            parcel: id,
            vehicle,
            group_vehicle,
        });
    }
    if let Some(carrier) = ctx.fleet.vehicle_mut(vehicle) {
        carrier.route.push(Stop::new(id, address.street.clone()));
    }
    debug!(parcel = id, vehicle, "Corrected parcel loaded");
    Some(vehicle)
}

/// Status of `parcel` at `time`.
///
/// ```
/// use parcel_dispatch::correction::assess_status;
/// use parcel_dispatch::domain::{Address, Parcel, ParcelStatus, Placement, Vehicle};
///
/// let truck = Vehicle::new(1, 16, 18.0, "Hub").with_start_time(8 * 3600);
/// let mut parcel = Parcel::new(1, Address::new("A", "X", "UT", "1"));
/// parcel.placement = Placement::Vehicle(1);
/// parcel.delivered_at = Some(9 * 3600);
///
/// assert_eq!(assess_status(&parcel, Some(&truck), 8 * 3600), ParcelStatus::AtHub);
/// assert_eq!(assess_status(&parcel, Some(&truck), 8 * 3600 + 1), ParcelStatus::EnRoute);
/// assert_eq!(assess_status(&parcel, Some(&truck), 9 * 3600), ParcelStatus::Delivered);
/// ```
pub fn assess_status(parcel: &Parcel, vehicle: Option<&Vehicle>, time: Seconds) -> ParcelStatus {
    if parcel.is_held() {
        return ParcelStatus::Held;
    }
    let Some(vehicle) = vehicle else {
        return ParcelStatus::AtHub;
    };
    if time <= vehicle.start_time {
        return ParcelStatus::AtHub;
    }
    match parcel.delivered_at {
        Some(delivered) if time >= delivered => ParcelStatus::Delivered,
        Some(_) => ParcelStatus::EnRoute,
        None => ParcelStatus::AtHub,
    }
}

/// A parcel as seen at one time of day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelSnapshot {
    pub id: ParcelId,
    pub address: Address,
    pub deadline: Option<Seconds>,
    pub weight: f64,
    pub notes: String,
    pub time: Seconds,
    pub status: ParcelStatus,
    pub vehicle: Option<VehicleId>,
    pub location: String,
    pub delivered_at: Option<Seconds>,
}

/// Records and returns the status of parcel `id` at `time`.
pub fn snapshot(ctx: &mut PlanContext, id: ParcelId, time: Seconds) -> Result<ParcelSnapshot, DispatchError> {
    let parcel = ctx.parcels.get(&id).ok_or(DispatchError::UnknownParcel(id))?;
    let vehicle = parcel.vehicle().and_then(|v| ctx.fleet.vehicle(v));
    let status = assess_status(parcel, vehicle, time);

    let location = match (status, vehicle) {
        (ParcelStatus::Held, _) => HOLD_LOCATION.to_string(),
        (ParcelStatus::Delivered, _) => parcel.address.street.clone(),
        (ParcelStatus::EnRoute, Some(vehicle)) => vehicle.location_at(time).to_string(),
        (_, Some(vehicle)) => vehicle.depot.clone(),
        (_, None) => ctx.config.depot.clone(),
    };

    let snapshot = ParcelSnapshot {
        id,
        address: parcel.address.clone(),
        deadline: parcel.deadline,
        weight: parcel.weight,
        notes: parcel.notes.clone(),
        time,
        status,
        vehicle: parcel.vehicle(),
        location,
        delivered_at: parcel.delivered_at,
    };

    if let Some(parcel) = ctx.parcels.get_mut(&id) {
        parcel.status = status;
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::distance::DistanceMatrix;
    use crate::domain::Constraint;
    use crate::ingest::Dataset;

    fn held_context() -> PlanContext {
        let streets = ["Hub", "A", "410 S State St"];
        let matrix = DistanceMatrix::from_fn(streets.iter().map(|s| s.to_string()).collect(), |i, j| {
            3.0 * (i as f64 - j as f64).abs()
        });
        let parcels = vec![
            Parcel::new(1, Address::new("A", "Salt Lake City", "UT", "84101")),
            Parcel::new(2, Address::new("Unknown", "N/A", "N/A", "N/A"))
                .with_constraint(Constraint::Flagged)
                .with_constraint(Constraint::DelayedUntil(10 * 3600)),
        ];
        let config = DispatchConfig {
            depot: "Hub".to_string(),
            ..DispatchConfig::default()
        };
        let mut ctx = PlanContext::new(&Dataset::new("test", parcels, matrix), config).unwrap();
        ctx.load(1, 3);
        ctx.hold(2);
        ctx.pending_corrections.insert(2);
        ctx.route_all();
        ctx
    }

    #[test]
    fn test_correction_waits_for_release_time() {
        let mut ctx = held_context();
        assert!(apply_corrections(&mut ctx, 9 * 3600).is_empty());
        assert!(ctx.parcels[&2].is_held());
    }

    #[test]
    fn test_correction_appends_stop_and_retimes() {
        let mut ctx = held_context();
        let corrected = apply_corrections(&mut ctx, 10 * 3600);

        assert_eq!(corrected, vec![2]);
        let parcel = &ctx.parcels[&2];
        assert!(!parcel.is_flagged());
        assert_eq!(parcel.address.street, "410 S State St");
        assert_eq!(parcel.vehicle(), Some(3));

        let vehicle = ctx.fleet.vehicle(3).unwrap();
        assert_eq!(vehicle.route_ids(), vec![1, 2]);
        // A is 3 away, the corrected stop 3 further: 20 minutes at 18/h.
        assert_eq!(parcel.delivered_at, Some(vehicle.start_time + 1200));
        assert_eq!(vehicle.total_distance, 12.0);
    }

    #[test]
    fn test_correction_is_applied_once() {
        let mut ctx = held_context();
        apply_corrections(&mut ctx, 10 * 3600);
        let route = ctx.fleet.vehicle(3).unwrap().route.clone();

        assert!(apply_corrections(&mut ctx, 11 * 3600).is_empty());
        assert_eq!(ctx.fleet.vehicle(3).unwrap().route, route);
    }

    #[test]
    fn test_snapshot_locations() {
        let mut ctx = held_context();
        let start = ctx.fleet.vehicle(3).unwrap().start_time;

        let held = snapshot(&mut ctx, 2, start).unwrap();
        assert_eq!(held.status, ParcelStatus::Held);
        assert_eq!(held.location, HOLD_LOCATION);

        let at_hub = snapshot(&mut ctx, 1, start).unwrap();
        assert_eq!(at_hub.status, ParcelStatus::AtHub);
        assert_eq!(at_hub.location, "Hub");

        let delivered = snapshot(&mut ctx, 1, start + 600).unwrap();
        assert_eq!(delivered.status, ParcelStatus::Delivered);
        assert_eq!(delivered.location, "A");
        assert_eq!(ctx.parcels[&1].status, ParcelStatus::Delivered);

        assert!(matches!(snapshot(&mut ctx, 42, start), Err(DispatchError::UnknownParcel(42))));
    }

    fn grouped_held_context(capacity: usize) -> PlanContext {
        let streets = ["Hub", "A", "410 S State St"];
        let matrix = DistanceMatrix::from_fn(streets.iter().map(|s| s.to_string()).collect(), |i, j| {
            3.0 * (i as f64 - j as f64).abs()
        });
        let parcels = vec![
            Parcel::new(1, Address::new("A", "Salt Lake City", "UT", "84101"))
                .with_constraint(Constraint::DeliverWith([2].into())),
            Parcel::new(2, Address::new("Unknown", "N/A", "N/A", "N/A"))
                .with_constraint(Constraint::Flagged)
                .with_constraint(Constraint::DelayedUntil(10 * 3600)),
        ];
        let config = DispatchConfig {
            depot: "Hub".to_string(),
            capacity,
            ..DispatchConfig::default()
        };
        let mut ctx = PlanContext::new(&Dataset::new("test", parcels, matrix), config).unwrap();
        crate::classify::classify(&mut ctx);
        ctx.route_all();
        ctx
    }

    #[test]
    fn test_corrected_group_member_joins_group_vehicle() {
        let mut ctx = grouped_held_context(16);
        assert!(ctx.parcels[&2].is_held());
        assert_eq!(ctx.parcels[&1].vehicle(), Some(1));

        assert_eq!(apply_corrections(&mut ctx, 10 * 3600), vec![2]);

        assert_eq!(ctx.parcels[&2].vehicle(), Some(1));
        assert_eq!(ctx.fleet.vehicle(1).unwrap().route_ids(), vec![1, 2]);
        assert!(ctx.parcels[&2].delivered_at.is_some());
        assert!(!ctx
            .diagnostics
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::CoDeliverySplit { .. })));
    }

    #[test]
    fn test_full_group_vehicle_splits_with_diagnostic() {
        let mut ctx = grouped_held_context(1);
        assert_eq!(ctx.parcels[&1].vehicle(), Some(1));

        apply_corrections(&mut ctx, 10 * 3600);

        assert_eq!(ctx.parcels[&2].vehicle(), Some(3));
        assert!(ctx.diagnostics.entries().contains(&Diagnostic::CoDeliverySplit {
            parcel: 2,
            vehicle: 3,
            group_vehicle: 1,
        }));
    }
}
