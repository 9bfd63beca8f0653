//! Fleet state.
//!
//! Owns the vehicles plus the bookkeeping every assignment touches:
//!
//! - the hold compartment (parcels in [`Placement::Held`])
//! - the address index: street address -> vehicles carrying a parcel there, in the
//!   order the vehicles were first recorded
//! - the unassigned roster
//!
//! All mutations go through [`Fleet::load`], [`Fleet::unload`], [`Fleet::hold`] and
//! [`Fleet::release`], so the index and roster always agree with the manifests.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::config::DispatchConfig;
use crate::domain::{Parcel, ParcelId, ParcelStatus, Placement, Seconds, Vehicle, VehicleId};

#[derive(Debug, Clone)]
pub struct Fleet {
    vehicles: Vec<Vehicle>,
    early_count: usize,
    hold_carrier: VehicleId,
    held: BTreeSet<ParcelId>,
    /// One entry per loaded parcel, so unloading drops exactly one occurrence.
    address_index: HashMap<String, Vec<VehicleId>>,
    unassigned: BTreeSet<ParcelId>,
}

impl Fleet {
    /// Builds an empty fleet. Early vehicles start at the configured time; later ones
    /// get their departure once routing knows when a driver frees up.
    ///
    /// ```
    /// use parcel_dispatch::config::DispatchConfig;
    /// use parcel_dispatch::fleet::Fleet;
    ///
    /// let fleet = Fleet::new(&DispatchConfig::default(), 8 * 3600);
    /// assert_eq!(fleet.len(), 3);
    /// assert_eq!(fleet.early_ids(), vec![1, 2]);
    /// assert_eq!(fleet.last_departing(), 3);
    /// ```
    pub fn new(config: &DispatchConfig, start_time: Seconds) -> Self {
        let vehicles = (1..=config.vehicle_count)
            .map(|id| Vehicle::new(id, config.capacity, config.speed, config.depot.clone()).with_start_time(start_time))
            .collect();
        Self {
            vehicles,
            early_count: config.early_count(),
            hold_carrier: config.hold_carrier,
            held: BTreeSet::new(),
            address_index: HashMap::new(),
            unassigned: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        id.checked_sub(1).and_then(|index| self.vehicles.get(index))
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        id.checked_sub(1).and_then(move |index| self.vehicles.get_mut(index))
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().map(|v| v.id).collect()
    }

    /// Vehicles leaving at the start time, in departure order.
    pub fn early_ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().take(self.early_count).map(|v| v.id).collect()
    }

    pub fn is_early(&self, id: VehicleId) -> bool {
        id >= 1 && id <= self.early_count.min(self.vehicles.len())
    }

    /// The vehicle scheduled to depart last.
    pub fn last_departing(&self) -> VehicleId {
        self.vehicles.len()
    }

    pub fn hold_carrier(&self) -> VehicleId {
        self.hold_carrier
    }

    pub fn held(&self) -> &BTreeSet<ParcelId> {
        &self.held
    }

    pub fn unassigned(&self) -> &BTreeSet<ParcelId> {
        &self.unassigned
    }

    /// Registers a parcel that has not been placed yet.
    pub fn track_unassigned(&mut self, parcel: ParcelId) {
        self.unassigned.insert(parcel);
    }

    /// Capacity left after the hold compartment takes its share.
    pub fn effective_capacity(&self, id: VehicleId) -> usize {
        let Some(vehicle) = self.vehicle(id) else {
            return 0;
        };
        if id == self.hold_carrier {
            vehicle.capacity.saturating_sub(self.held.len())
        } else {
            vehicle.capacity
        }
    }

    pub fn free_slots(&self, id: VehicleId) -> usize {
        let load = self.vehicle(id).map_or(0, |v| v.manifest.len());
        self.effective_capacity(id).saturating_sub(load)
    }

    pub fn has_room(&self, id: VehicleId) -> bool {
        self.free_slots(id) > 0
    }

    /// Vehicles carrying a parcel to `address`, in recorded order, without repeats.
    pub fn vehicles_at(&self, address: &str) -> Vec<VehicleId> {
        let mut seen = Vec::new();
        for id in self.address_index.get(address).into_iter().flatten() {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }

    /// Loads `parcel` onto vehicle `id` when there is room. Returns whether it was loaded.
    pub fn load(&mut self, parcel: &mut Parcel, id: VehicleId) -> bool {
        if parcel.vehicle() == Some(id) {
            return true;
        }
        if !self.has_room(id) || parcel.placement != Placement::Unassigned {
            return false;
        }
        let Some(vehicle) = self.vehicle_mut(id) else {
            return false;
        };
        vehicle.manifest.push(parcel.id);
        parcel.placement = Placement::Vehicle(id);
        parcel.status = ParcelStatus::AtHub;
        self.address_index
            .entry(parcel.address.street.clone())
            .or_default()
            .push(id);
        self.unassigned.remove(&parcel.id);
        debug!(parcel = parcel.id, vehicle = id, "Loaded parcel");
        true
    }

    /// Takes `parcel` off its vehicle, back onto the unassigned roster.
    pub fn unload(&mut self, parcel: &mut Parcel) {
        let Some(id) = parcel.vehicle() else {
            return;
        };
        if let Some(vehicle) = self.vehicle_mut(id) {
            vehicle.manifest.retain(|p| *p != parcel.id);
            vehicle.route.retain(|stop| stop.parcel != parcel.id);
        }
        let street = parcel.address.street.as_str();
        if let Some(ids) = self.address_index.get_mut(street) {
            if let Some(pos) = ids.iter().position(|v| *v == id) {
                ids.remove(pos);
            }
            if ids.is_empty() {
                self.address_index.remove(street);
            }
        }
        parcel.placement = Placement::Unassigned;
        parcel.delivered_at = None;
        parcel.status = ParcelStatus::AtHub;
        self.unassigned.insert(parcel.id);
        debug!(parcel = parcel.id, vehicle = id, "Unloaded parcel");
    }

    /// Moves `parcel` into the hold compartment.
    pub fn hold(&mut self, parcel: &mut Parcel) {
        self.unload(parcel);
        parcel.placement = Placement::Held;
        parcel.status = ParcelStatus::Held;
        self.unassigned.remove(&parcel.id);
        self.held.insert(parcel.id);
        debug!(parcel = parcel.id, held = self.held.len(), "Parcel held");
    }

    /// Takes `parcel` out of the hold compartment, leaving it unassigned.
    pub fn release(&mut self, parcel: &mut Parcel) {
        if self.held.remove(&parcel.id) {
            parcel.placement = Placement::Unassigned;
            parcel.status = ParcelStatus::AtHub;
            self.unassigned.insert(parcel.id);
        }
    }

    /// Sum of every vehicle's route distance, return legs included.
    pub fn total_distance(&self) -> f64 {
        self.vehicles.iter().map(|v| v.total_distance).sum()
    }
}
