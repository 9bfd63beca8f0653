//! Fleet re-optimization.
//!
//! A single rebalancing pass used when the last-departing vehicle's route cannot be
//! repaired. Only unconstrained parcels move. Three buckets are lifted off the fleet
//! and re-placed:
//!
//! - `regrouped`: destinations in a regroup city, sent to that city's vehicle
//! - `deadlines`: deadline parcels on the last-departing vehicle, moved to early vehicles
//!   along with the same-address parcels riding with them
//! - `flexible`: deadline-free parcels on early vehicles, re-placed by locality
//!
//! Parcels sharing an address move as one unit. A final regather step pulls split
//! same-address parcels onto the vehicle of the lowest id when it has room. The caller
//! re-routes the fleet afterwards.

use serde::Serialize;
use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::domain::{Parcel, ParcelArena, ParcelId, VehicleId};
use crate::error::Diagnostic;
use crate::fleet::Fleet;
use crate::planner::PlanContext;

/// Parcels lifted by a re-optimization pass, per bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub regrouped: BTreeSet<ParcelId>,
    pub flexible: BTreeSet<ParcelId>,
    pub deadlines: BTreeSet<ParcelId>,
}

impl Relocation {
    pub fn len(&self) -> usize {
        self.regrouped.len() + self.flexible.len() + self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> impl Iterator<Item = ParcelId> + '_ {
        self.flexible
            .iter()
            .chain(&self.deadlines)
            .chain(&self.regrouped)
            .copied()
    }
}

/// True when a same-address sibling cannot move with `parcel`: it is constrained,
/// carries a deadline, or rides a late-departing vehicle.
fn anchored_by_sibling(parcel: &Parcel, parcels: &ParcelArena, fleet: &Fleet) -> bool {
    parcel
        .identical_siblings
        .iter()
        .filter_map(|id| parcels.get(id))
        .any(|sibling| {
            sibling.is_constrained()
                || sibling.deadline.is_some()
                || sibling.vehicle().is_some_and(|v| !fleet.is_early(v))
        })
}

/// Sorts movable parcels into buckets without touching the fleet.
pub fn select(ctx: &PlanContext) -> Relocation {
    let mut relocation = Relocation::default();
    let last = ctx.fleet.last_departing();

    for vehicle in ctx.fleet.vehicles() {
        for id in &vehicle.manifest {
            let Some(parcel) = ctx.parcels.get(id) else {
                continue;
            };
            if parcel.is_constrained() {
                continue;
            }
            let regroup = ctx
                .config
                .regroup_localities
                .iter()
                .any(|rule| rule.matches(&parcel.address.city));

            if regroup {
                relocation.regrouped.insert(*id);
            } else if parcel.deadline.is_none() {
                if ctx.fleet.is_early(vehicle.id) && !anchored_by_sibling(parcel, &ctx.parcels, &ctx.fleet) {
                    relocation.flexible.insert(*id);
                }
            } else if vehicle.id == last {
                relocation.deadlines.insert(*id);
            }
        }
    }

    let riders: Vec<ParcelId> = relocation
        .deadlines
        .iter()
        .filter_map(|id| ctx.parcels.get(id))
        .flat_map(|parcel| parcel.identical_siblings.iter().copied())
        .filter(|id| {
            ctx.parcels
                .get(id)
                .is_some_and(|p| !p.is_constrained() && p.vehicle() == Some(last))
        })
        .collect();
    relocation.deadlines.extend(riders);

    relocation
}

/// Runs one re-optimization pass over `ctx`.
pub fn reoptimize(ctx: &mut PlanContext) -> Relocation {
    let relocation = select(ctx);
    info!(
        regrouped = relocation.regrouped.len(),
        flexible = relocation.flexible.len(),
        deadlines = relocation.deadlines.len(),
        "Re-optimizing fleet"
    );

    for id in relocation.all() {
        ctx.unload(id);
    }

    for id in &relocation.regrouped {
        let city = ctx.parcels.get(id).map(|p| p.address.city.clone()).unwrap_or_default();
        let target: Vec<VehicleId> = ctx
            .config
            .regroup_localities
            .iter()
            .find(|rule| rule.matches(&city))
            .map(|rule| rule.vehicle)
            .into_iter()
            .collect();
        place_unit(ctx, *id, &relocation.regrouped, target);
    }

    for id in &relocation.deadlines {
        let early = ctx.fleet.early_ids();
        place_unit(ctx, *id, &relocation.deadlines, early);
    }

    for id in &relocation.flexible {
        if !ctx.parcels.get(id).is_some_and(|p| p.is_unassigned()) {
            continue;
        }
        let street = ctx.parcels.get(id).map(|p| p.address.street.clone()).unwrap_or_default();
        let nearest = ctx
            .distances
            .nearest_neighbor(
                &street,
                ctx.known_addresses.iter().map(String::as_str),
                &mut ctx.diagnostics,
            )
            .map(str::to_string);

        let mut candidates = nearest.map(|address| ctx.fleet.vehicles_at(&address)).unwrap_or_default();
        let early = ctx.fleet.early_ids();
        candidates.extend(early.first());
        candidates.push(ctx.fleet.last_departing());
        candidates.extend(early.iter().skip(1));
        place_unit(ctx, *id, &relocation.flexible, candidates);
    }

    let mut regathered = 0;
    while regather(ctx) {
        regathered += 1;
    }
    debug!(regathered, "Regather complete");

    relocation
}

/// Loads `id` and its unplaced same-address siblings from `bucket` onto one vehicle.
///
/// The first candidate with room for the whole unit wins, falling back to any vehicle.
/// When none has room the members are loaded one by one, each trying the vehicle that
/// took the previous member first.
fn place_unit(ctx: &mut PlanContext, id: ParcelId, bucket: &BTreeSet<ParcelId>, candidates: Vec<VehicleId>) {
    let Some(parcel) = ctx.parcels.get(&id) else {
        return;
    };
    if !parcel.is_unassigned() {
        return;
    }
    let mut unit: Vec<ParcelId> = parcel
        .identical_siblings
        .iter()
        .filter(|sibling| bucket.contains(sibling))
        .filter(|sibling| ctx.parcels.get(sibling).is_some_and(|p| p.is_unassigned()))
        .copied()
        .collect();
    unit.push(id);
    unit.sort_unstable();

    let mut order = candidates;
    order.extend(ctx.fleet.ids());

    if let Some(vehicle) = order.iter().copied().find(|v| ctx.fleet.free_slots(*v) >= unit.len()) {
        for member in &unit {
            ctx.load(*member, vehicle);
        }
        debug!(parcels = ?unit, vehicle, "Parcels relocated");
        return;
    }

    let mut previous: Option<VehicleId> = None;
    for member in unit {
        let tried = previous.into_iter().chain(order.iter().copied());
        match ctx.load_first(member, tried) {
            Some(vehicle) => {
                debug!(parcel = member, vehicle, "Parcel relocated");
                previous = Some(vehicle);
            }
            None => ctx.diagnostics.push(Diagnostic::UnassignableParcel { parcel: member }),
        }
    }
}

/// Moves one split set of unconstrained same-address parcels onto the vehicle of its
/// lowest id, when that vehicle has room for the rest. Returns whether anything moved.
///
/// A move unifies one set and never splits another, so repeated calls terminate.
fn regather(ctx: &mut PlanContext) -> bool {
    let Some((vehicle, strays)) = split_set(ctx) else {
        return false;
    };
    for stray in &strays {
        ctx.unload(*stray);
        ctx.load(*stray, vehicle);
    }
    debug!(parcels = ?strays, vehicle, "Same-address parcels regathered");
    true
}

/// First split set whose lowest id's vehicle can take the strays.
fn split_set(ctx: &PlanContext) -> Option<(VehicleId, Vec<ParcelId>)> {
    let movable = |p: &&Parcel| !p.is_constrained() && p.vehicle().is_some();

    ctx.parcels.values().filter(movable).find_map(|parcel| {
        let siblings: Vec<&Parcel> = parcel
            .identical_siblings
            .iter()
            .filter_map(|id| ctx.parcels.get(id))
            .filter(movable)
            .collect();
        if siblings.iter().any(|sibling| sibling.id < parcel.id) {
            return None;
        }
        let vehicle = parcel.vehicle()?;
        let strays: Vec<ParcelId> = siblings
            .iter()
            .filter(|sibling| sibling.vehicle() != Some(vehicle))
            .map(|sibling| sibling.id)
            .collect();
        let fits = !strays.is_empty() && ctx.fleet.free_slots(vehicle) >= strays.len();
        fits.then_some((vehicle, strays))
    })
}
