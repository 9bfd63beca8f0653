//! Parcel classification and vehicle assignment.
//!
//! Runs in two passes over a freshly loaded [`PlanContext`]:
//!
//! - **Pass 1** places constrained parcels. Each parcel is handled by the first entry
//!   of [`CONSTRAINT_PRIORITY`](crate::domain::CONSTRAINT_PRIORITY) it carries: flagged
//!   parcels go to the hold compartment, delayed ones to the last-departing vehicle,
//!   fixed-vehicle ones to their vehicle, and co-delivery groups onto one vehicle.
//! - **Pass 2** places the remaining parcels in id order by locality: a grouped city,
//!   then the vehicle already serving the nearest known address, then the early
//!   vehicles for deadline parcels, then any vehicle. Same-address parcels follow the
//!   first one placed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::domain::{Constraint, ParcelArena, ParcelId, VehicleId};
use crate::error::Diagnostic;
use crate::planner::PlanContext;

/// Classifies every parcel in `ctx`.
pub fn classify(ctx: &mut PlanContext) {
    link_co_delivery(&mut ctx.parcels);
    link_identical_addresses(&mut ctx.parcels);
    ctx.known_addresses = known_addresses(&ctx.parcels);

    place_constrained(ctx);
    place_unconstrained(ctx);

    info!(
        held = ctx.fleet.held().len(),
        unassigned = ctx.fleet.unassigned().len(),
        loads = ?ctx.fleet.vehicles().iter().map(|v| v.manifest.len()).collect::<Vec<_>>(),
        "Classification complete"
    );
}

/// Makes co-delivery symmetric and transitive.
///
/// Every parcel ends up listing all other members of its connected group. Ids that
/// are not in the arena are dropped.
///
/// ```
/// use parcel_dispatch::classify::link_co_delivery;
/// use parcel_dispatch::domain::{Address, Constraint, Parcel, ParcelArena};
///
/// let address = Address::new("1 A St", "Salt Lake City", "UT", "84101");
/// let mut parcels: ParcelArena = (1..=4).map(|id| (id, Parcel::new(id, address.clone()))).collect();
/// parcels.get_mut(&1).unwrap().set_constraint(Constraint::DeliverWith([2].into()));
/// parcels.get_mut(&3).unwrap().set_constraint(Constraint::DeliverWith([2].into()));
///
/// link_co_delivery(&mut parcels);
///
/// assert_eq!(parcels[&2].deliver_with(), [1, 3].into());
/// assert_eq!(parcels[&1].deliver_with(), [2, 3].into());
/// assert!(parcels[&4].deliver_with().is_empty());
/// ```
pub fn link_co_delivery(parcels: &mut ParcelArena) {
    let mut groups: Vec<BTreeSet<ParcelId>> = Vec::new();

    for parcel in parcels.values() {
        let mut members: BTreeSet<ParcelId> = parcel
            .deliver_with()
            .into_iter()
            .filter(|id| parcels.contains_key(id))
            .collect();
        if members.is_empty() {
            continue;
        }
        members.insert(parcel.id);

        let (touching, mut rest): (Vec<_>, Vec<_>) =
            groups.into_iter().partition(|group| !group.is_disjoint(&members));
        for group in touching {
            members.extend(group);
        }
        rest.push(members);
        groups = rest;
    }

    for parcel in parcels.values_mut() {
        parcel.remove_constraint(crate::domain::ConstraintKind::DeliverWith);
    }
    for group in groups {
        for id in &group {
            let others: BTreeSet<ParcelId> = group.iter().filter(|other| *other != id).copied().collect();
            if let Some(parcel) = parcels.get_mut(id) {
                parcel.set_constraint(Constraint::DeliverWith(others));
            }
        }
        debug!(group = ?group, "Co-delivery group");
    }
}

/// Links routable parcels that share a street address, both ways.
pub fn link_identical_addresses(parcels: &mut ParcelArena) {
    let mut by_street: BTreeMap<String, Vec<ParcelId>> = BTreeMap::new();
    for parcel in parcels.values_mut() {
        parcel.identical_siblings.clear();
        if !parcel.is_flagged() {
            by_street.entry(parcel.address.street.clone()).or_default().push(parcel.id);
        }
    }

    for ids in by_street.values().filter(|ids| ids.len() > 1) {
        for id in ids {
            if let Some(parcel) = parcels.get_mut(id) {
                parcel.identical_siblings = ids.iter().filter(|other| *other != id).copied().collect();
            }
        }
    }
}

/// Distinct destinations of routable parcels in id order.
pub fn known_addresses(parcels: &ParcelArena) -> Vec<String> {
    let mut seen = BTreeSet::new();
    parcels
        .values()
        .filter(|p| !p.is_flagged())
        .filter(|p| seen.insert(p.address.street.clone()))
        .map(|p| p.address.street.clone())
        .collect()
}

/// Places constrained parcels by priority rank, then id.
///
/// Ranking across the whole set puts flagged parcels in the hold compartment before
/// anything is loaded, so the hold carrier never ends up above its effective capacity.
fn place_constrained(ctx: &mut PlanContext) {
    let mut order: Vec<(usize, ParcelId)> = ctx
        .parcels
        .values()
        .filter_map(|p| p.priority_rank().map(|rank| (rank, p.id)))
        .collect();
    order.sort_unstable();

    let mut grouped = BTreeSet::new();

    for (_, id) in order {
        if grouped.contains(&id) {
            continue;
        }
        let Some(parcel) = ctx.parcels.get(&id) else {
            continue;
        };
        if !parcel.is_unassigned() {
            if let Some(vehicle) = parcel.vehicle() {
                ctx.diagnostics.push(Diagnostic::AlreadyAssigned { parcel: id, vehicle });
            }
            continue;
        }
        let Some(constraint) = parcel.primary_constraint().cloned() else {
            continue;
        };
        let awaits_correction = parcel.delayed_until().is_some();

        match constraint {
            Constraint::Flagged => {
                ctx.hold(id);
                if awaits_correction {
                    ctx.pending_corrections.insert(id);
                }
                debug!(parcel = id, "Flagged parcel held");
            }
            Constraint::DelayedUntil(_) => {
                let last = ctx.fleet.last_departing();
                load_or_report(ctx, id, last);
            }
            Constraint::RequiredVehicle(vehicle) => load_or_report(ctx, id, vehicle),
            Constraint::DeliverWith(siblings) => {
                let group = place_group(ctx, id, siblings);
                grouped.extend(group);
            }
        }
    }
}

fn load_or_report(ctx: &mut PlanContext, parcel: ParcelId, vehicle: VehicleId) {
    if !ctx.load(parcel, vehicle) {
        ctx.diagnostics.push(Diagnostic::UnassignableParcel { parcel });
    }
}

/// Loads a whole co-delivery group onto one vehicle. Returns the group's members.
///
/// A group member already on a vehicle decides the target; otherwise the first vehicle
/// in departure order with room for every unplaced member takes them all. A group that
/// fits nowhere is reported once and left unassigned.
fn place_group(ctx: &mut PlanContext, id: ParcelId, siblings: BTreeSet<ParcelId>) -> BTreeSet<ParcelId> {
    let mut group = siblings;
    group.insert(id);

    let pending: Vec<ParcelId> = group
        .iter()
        .filter(|member| ctx.parcels.get(member).is_some_and(|p| p.is_unassigned()))
        .copied()
        .collect();
    let joined = group
        .iter()
        .find_map(|member| ctx.parcels.get(member).and_then(|p| p.vehicle()));

    let fits = |vehicle: &VehicleId| ctx.fleet.free_slots(*vehicle) >= pending.len();
    let target = match joined {
        Some(vehicle) => Some(vehicle).filter(fits),
        None => ctx.fleet.ids().into_iter().find(fits),
    };

    match target {
        Some(vehicle) => {
            for member in pending {
                ctx.load(member, vehicle);
            }
            debug!(parcel = id, vehicle, "Co-delivery group loaded");
        }
        None => ctx.diagnostics.push(Diagnostic::CapacityExceededGroup {
            parcel: id,
            group: group.iter().copied().collect(),
        }),
    }
    group
}

fn place_unconstrained(ctx: &mut PlanContext) {
    let ids: Vec<ParcelId> = ctx
        .parcels
        .values()
        .filter(|p| !p.is_constrained())
        .map(|p| p.id)
        .collect();

    for id in ids {
        place_by_locality(ctx, id);
    }
}

fn place_by_locality(ctx: &mut PlanContext, id: ParcelId) {
    let Some(parcel) = ctx.parcels.get(&id) else {
        return;
    };
    let street = parcel.address.street.clone();
    let city = parcel.address.city.clone();
    let has_deadline = parcel.deadline.is_some();
    let siblings = parcel.identical_siblings.clone();
    let mut vehicle = parcel.vehicle();

    if vehicle.is_none() {
        let grouped = ctx
            .config
            .grouped_localities
            .iter()
            .find(|rule| rule.matches(&city))
            .map(|rule| rule.vehicle);
        if let Some(target) = grouped {
            vehicle = ctx.load_first(id, [target]);
        }
    }

    if vehicle.is_none() {
        let nearest = ctx
            .distances
            .nearest_neighbor(
                &street,
                ctx.known_addresses.iter().map(String::as_str),
                &mut ctx.diagnostics,
            )
            .map(str::to_string);
        if let Some(nearest) = nearest {
            let serving = ctx.fleet.vehicles_at(&nearest);
            vehicle = ctx.load_first(id, serving);
        }
    }

    if vehicle.is_none() && has_deadline {
        let early = ctx.fleet.early_ids();
        vehicle = ctx.load_first(id, early);
    }

    if vehicle.is_none() {
        let all = ctx.fleet.ids();
        vehicle = ctx.load_first(id, all);
    }

    match vehicle {
        Some(vehicle) => {
            for sibling in siblings {
                let waiting = ctx
                    .parcels
                    .get(&sibling)
                    .is_some_and(|p| p.is_unassigned() && !p.is_constrained());
                if waiting && ctx.load(sibling, vehicle) {
                    debug!(parcel = sibling, vehicle, "Same-address parcel co-loaded");
                }
            }
        }
        None => ctx.diagnostics.push(Diagnostic::UnassignableParcel { parcel: id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::distance::DistanceMatrix;
    use crate::domain::{Address, Parcel};
    use crate::ingest::Dataset;

    const STREETS: [&str; 6] = ["Hub", "North 1", "North 2", "South 1", "South 2", "Far"];

    fn matrix() -> DistanceMatrix {
        let positions = [0.0, 2.0, 3.0, -2.0, -3.0, 20.0];
        DistanceMatrix::from_fn(STREETS.iter().map(|s| s.to_string()).collect(), |i, j| {
            f64::abs(positions[i] - positions[j])
        })
    }

    fn parcel(id: ParcelId, street: &str) -> Parcel {
        Parcel::new(id, Address::new(street, "Salt Lake City", "UT", "84101"))
    }

    fn context(parcels: Vec<Parcel>, config: DispatchConfig) -> PlanContext {
        let config = DispatchConfig {
            depot: "Hub".to_string(),
            grouped_localities: Vec::new(),
            ..config
        };
        PlanContext::new(&Dataset::new("test", parcels, matrix()), config).unwrap()
    }

    #[test]
    fn test_pass_one_follows_priority_table() {
        let parcels = vec![
            parcel(1, "North 1").with_constraint(Constraint::Flagged),
            parcel(2, "North 2")
                .with_constraint(Constraint::RequiredVehicle(1))
                .with_constraint(Constraint::DelayedUntil(9 * 3600)),
            parcel(3, "South 1").with_constraint(Constraint::RequiredVehicle(2)),
        ];
        let mut ctx = context(parcels, DispatchConfig::default());

        classify(&mut ctx);

        assert!(ctx.parcels[&1].is_held());
        // Delayed outranks the fixed vehicle.
        assert_eq!(ctx.parcels[&2].vehicle(), Some(3));
        assert_eq!(ctx.parcels[&3].vehicle(), Some(2));
    }

    #[test]
    fn test_group_joins_placed_sibling() {
        let parcels = vec![
            parcel(1, "North 1").with_constraint(Constraint::RequiredVehicle(2)),
            parcel(2, "South 1").with_constraint(Constraint::DeliverWith([1].into())),
            parcel(3, "South 2").with_constraint(Constraint::DeliverWith([2].into())),
        ];
        let mut ctx = context(parcels, DispatchConfig::default());

        classify(&mut ctx);

        for id in 1..=3 {
            assert_eq!(ctx.parcels[&id].vehicle(), Some(2), "parcel {}", id);
        }
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_oversized_group_is_reported_and_left_unassigned() {
        let config = DispatchConfig {
            capacity: 2,
            ..DispatchConfig::default()
        };
        let parcels = vec![
            parcel(1, "North 1").with_constraint(Constraint::DeliverWith([2, 3].into())),
            parcel(2, "North 2"),
            parcel(3, "South 1"),
        ];
        let mut ctx = context(parcels, config);

        classify(&mut ctx);

        assert!(ctx.parcels[&1].is_unassigned());
        assert_eq!(
            ctx.diagnostics.entries(),
            &[Diagnostic::CapacityExceededGroup {
                parcel: 1,
                group: vec![1, 2, 3],
            }]
        );
    }

    #[test]
    fn test_hold_is_taken_before_delayed_parcels_load() {
        let config = DispatchConfig {
            capacity: 2,
            ..DispatchConfig::default()
        };
        let parcels = vec![
            parcel(1, "North 1").with_constraint(Constraint::DelayedUntil(9 * 3600)),
            parcel(2, "North 2").with_constraint(Constraint::DelayedUntil(9 * 3600)),
            parcel(3, "South 1").with_constraint(Constraint::Flagged),
        ];
        let mut ctx = context(parcels, config);

        classify(&mut ctx);

        assert!(ctx.parcels[&3].is_held());
        assert_eq!(ctx.parcels[&1].vehicle(), Some(3));
        assert!(ctx.parcels[&2].is_unassigned());
        let carrier = ctx.fleet.vehicle(3).unwrap();
        assert!(carrier.manifest.len() <= ctx.fleet.effective_capacity(3));
        assert_eq!(ctx.diagnostics.entries(), &[Diagnostic::UnassignableParcel { parcel: 2 }]);
    }

    #[test]
    fn test_unconstrained_parcel_joins_nearest_served_address() {
        let parcels = vec![
            parcel(1, "South 1").with_constraint(Constraint::RequiredVehicle(2)),
            parcel(2, "South 2"),
            parcel(3, "North 1"),
            parcel(4, "North 2"),
        ];
        let mut ctx = context(parcels, DispatchConfig::default());

        classify(&mut ctx);

        // South 2's nearest known address is South 1, which vehicle 2 serves.
        assert_eq!(ctx.parcels[&2].vehicle(), Some(2));
        // North 2 is not loaded yet when North 1 is placed, and there is no deadline.
        assert_eq!(ctx.parcels[&3].vehicle(), Some(1));
        // By then North 1 is served by vehicle 1.
        assert_eq!(ctx.parcels[&4].vehicle(), Some(1));
    }

    #[test]
    fn test_grouped_locality_wins() {
        let mut holladay = parcel(1, "Far");
        holladay.address.city = "Holladay".to_string();
        let mut ctx = context(vec![holladay], DispatchConfig::default());
        ctx.config.grouped_localities = vec![crate::config::LocalityRule::new("Holladay", 3)];

        classify(&mut ctx);

        assert_eq!(ctx.parcels[&1].vehicle(), Some(3));
    }

    #[test]
    fn test_same_address_parcels_are_co_loaded() {
        let parcels = vec![
            parcel(1, "North 2").with_constraint(Constraint::RequiredVehicle(3)),
            parcel(2, "North 1"),
            parcel(3, "Far"),
            parcel(4, "North 1"),
        ];
        let mut ctx = context(parcels, DispatchConfig::default());

        classify(&mut ctx);

        assert_eq!(ctx.parcels[&2].vehicle(), Some(3));
        assert_eq!(ctx.parcels[&4].vehicle(), ctx.parcels[&2].vehicle());
        assert_eq!(ctx.parcels[&2].identical_siblings, [4].into());
    }

    #[test]
    fn test_full_fleet_reports_unassignable() {
        let config = DispatchConfig {
            vehicle_count: 1,
            driver_count: 1,
            capacity: 1,
            hold_carrier: 1,
            correction: crate::config::CorrectionConfig {
                target_vehicle: 1,
                ..Default::default()
            },
            regroup_localities: Vec::new(),
            ..DispatchConfig::default()
        };
        let parcels = vec![parcel(1, "North 1"), parcel(2, "Far")];
        let mut ctx = context(parcels, config);

        classify(&mut ctx);

        assert_eq!(ctx.fleet.unassigned().iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(ctx.diagnostics.entries(), &[Diagnostic::UnassignableParcel { parcel: 2 }]);
    }
}
