//! Domain model for parcel dispatch.
//!
//! # Overview
//!
//! - [`Parcel`]: a deliverable unit with a destination, an optional deadline and a
//!   list of hard [`Constraint`]s
//! - [`Vehicle`]: a capacity-bounded truck with a manifest, a route and a timing log
//! - [`Stop`]: one parcel delivery in a route
//!
//! # Design
//!
//! Parcels live in an arena keyed by [`ParcelId`]; sibling relations (co-delivery and
//! identical address) are stored as id sets, never as references. Times of day are
//! plain seconds from midnight.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::DispatchError;

/// Parcel identifier.
pub type ParcelId = u32;

/// Vehicle identifier, 1-based.
pub type VehicleId = usize;

/// Time of day in seconds from midnight.
pub type Seconds = i64;

/// Parcel records keyed by id; iteration is in id order.
pub type ParcelArena = BTreeMap<ParcelId, Parcel>;

/// Accepted time-of-day formats, tried in order.
const TIME_FORMATS: [&str; 4] = ["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// Parses a time of day into seconds from midnight.
///
/// # Examples
///
/// ```
/// use parcel_dispatch::domain::parse_time_of_day;
///
/// assert_eq!(parse_time_of_day("08:00:00").unwrap(), 8 * 3600);
/// assert_eq!(parse_time_of_day("9:05").unwrap(), 9 * 3600 + 5 * 60);
/// assert_eq!(parse_time_of_day("10:30 AM").unwrap(), 10 * 3600 + 30 * 60);
/// assert!(parse_time_of_day("25:00:00").is_err());
/// ```
pub fn parse_time_of_day(input: &str) -> Result<Seconds, DispatchError> {
    let trimmed = input.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .map(|time| time.num_seconds_from_midnight() as Seconds)
        .ok_or_else(|| DispatchError::InvalidTimeInput(input.to_string()))
}

/// Parses a delivery deadline; `EOD` (end of day) or an empty cell means no deadline.
///
/// ```
/// use parcel_dispatch::domain::parse_deadline;
///
/// assert_eq!(parse_deadline("EOD").unwrap(), None);
/// assert_eq!(parse_deadline("9:00 AM").unwrap(), Some(9 * 3600));
/// ```
pub fn parse_deadline(input: &str) -> Result<Option<Seconds>, DispatchError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("eod") || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_time_of_day(trimmed).map(Some)
}

/// Formats seconds from midnight as `HH:MM:SS`.
///
/// ```
/// use parcel_dispatch::domain::format_time_of_day;
///
/// assert_eq!(format_time_of_day(0), "00:00:00");
/// assert_eq!(format_time_of_day(9 * 3600 + 5 * 60 + 7), "09:05:07");
/// ```
pub fn format_time_of_day(seconds: Seconds) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// A destination address. Distance lookups key on `street` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
        }
    }

    /// Single-line form, e.g. `410 S State St, Salt Lake City, UT 84111`.
    pub fn full(&self) -> String {
        format!("{}, {}, {} {}", self.street, self.city, self.state, self.zip)
    }
}

/// Discriminant of [`Constraint`], used by the priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    Flagged,
    Delayed,
    RequiredVehicle,
    DeliverWith,
}

impl ConstraintKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintKind::Flagged => "FLAGGED",
            ConstraintKind::Delayed => "DELAYED",
            ConstraintKind::RequiredVehicle => "REQUIRED_VEHICLE",
            ConstraintKind::DeliverWith => "DELIVER_WITH",
        }
    }
}

/// Order in which pass 1 of classification honors constraints. The first kind a
/// parcel carries decides its placement.
pub const CONSTRAINT_PRIORITY: [ConstraintKind; 4] = [
    ConstraintKind::Flagged,
    ConstraintKind::Delayed,
    ConstraintKind::RequiredVehicle,
    ConstraintKind::DeliverWith,
];

/// A hard constraint derived from a parcel's free-text notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Constraint {
    /// The destination is unreliable; the parcel is held and not routable.
    Flagged,
    /// Not physically available before this time.
    DelayedUntil(Seconds),
    /// Must ride on this vehicle.
    RequiredVehicle(VehicleId),
    /// Must share a vehicle with these parcels.
    DeliverWith(BTreeSet<ParcelId>),
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Flagged => ConstraintKind::Flagged,
            Constraint::DelayedUntil(_) => ConstraintKind::Delayed,
            Constraint::RequiredVehicle(_) => ConstraintKind::RequiredVehicle,
            Constraint::DeliverWith(_) => ConstraintKind::DeliverWith,
        }
    }
}

/// Where a parcel currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "vehicle", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    #[default]
    Unassigned,
    Vehicle(VehicleId),
    Held,
}

/// Delivery status as of some time of day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    #[default]
    AtHub,
    EnRoute,
    Delivered,
    Held,
}

impl ParcelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParcelStatus::AtHub => "AT_HUB",
            ParcelStatus::EnRoute => "EN_ROUTE",
            ParcelStatus::Delivered => "DELIVERED",
            ParcelStatus::Held => "HELD",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParcelStatus::AtHub => "At hub",
            ParcelStatus::EnRoute => "En route",
            ParcelStatus::Delivered => "Delivered",
            ParcelStatus::Held => "Held",
        };
        f.write_str(label)
    }
}

/// A single deliverable parcel.
///
/// # Examples
///
/// ```
/// use parcel_dispatch::domain::{Address, Constraint, ConstraintKind, Parcel};
///
/// let parcel = Parcel::new(3, Address::new("233 Canyon Rd", "Salt Lake City", "UT", "84103"))
///     .with_deadline(10 * 3600 + 30 * 60)
///     .with_constraint(Constraint::RequiredVehicle(2));
///
/// assert!(parcel.is_constrained());
/// assert_eq!(parcel.required_vehicle(), Some(2));
/// assert_eq!(parcel.primary_constraint().map(|c| c.kind()), Some(ConstraintKind::RequiredVehicle));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: ParcelId,
    pub address: Address,
    /// Latest delivery time; `None` means any time.
    pub deadline: Option<Seconds>,
    pub weight: f64,
    pub notes: String,
    pub constraints: Vec<Constraint>,

    // Mutated by planning.
    /// Other parcels with exactly the same destination street address.
    #[serde(default)]
    pub identical_siblings: BTreeSet<ParcelId>,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub delivered_at: Option<Seconds>,
    #[serde(default)]
    pub status: ParcelStatus,
}

impl Parcel {
    pub fn new(id: ParcelId, address: Address) -> Self {
        Self {
            id,
            address,
            deadline: None,
            weight: 0.0,
            notes: String::new(),
            constraints: Vec::new(),
            identical_siblings: BTreeSet::new(),
            placement: Placement::Unassigned,
            delivered_at: None,
            status: ParcelStatus::AtHub,
        }
    }

    pub fn with_deadline(mut self, deadline: Seconds) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Adds a constraint, replacing any existing one of the same kind.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.set_constraint(constraint);
        self
    }

    pub fn set_constraint(&mut self, constraint: Constraint) {
        let kind = constraint.kind();
        self.constraints.retain(|c| c.kind() != kind);
        self.constraints.push(constraint);
    }

    pub fn remove_constraint(&mut self, kind: ConstraintKind) {
        self.constraints.retain(|c| c.kind() != kind);
    }

    pub fn is_flagged(&self) -> bool {
        self.constraints.iter().any(|c| matches!(c, Constraint::Flagged))
    }

    pub fn delayed_until(&self) -> Option<Seconds> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::DelayedUntil(t) => Some(*t),
            _ => None,
        })
    }

    pub fn required_vehicle(&self) -> Option<VehicleId> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::RequiredVehicle(v) => Some(*v),
            _ => None,
        })
    }

    /// Co-delivery siblings; empty when the parcel has none.
    pub fn deliver_with(&self) -> BTreeSet<ParcelId> {
        self.constraints
            .iter()
            .find_map(|c| match c {
                Constraint::DeliverWith(ids) => Some(ids.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// True when any hard constraint applies.
    pub fn is_constrained(&self) -> bool {
        self.constraints.iter().any(|c| match c {
            Constraint::DeliverWith(ids) => !ids.is_empty(),
            _ => true,
        })
    }

    /// The constraint that decides pass 1 placement, per [`CONSTRAINT_PRIORITY`].
    pub fn primary_constraint(&self) -> Option<&Constraint> {
        CONSTRAINT_PRIORITY.iter().find_map(|kind| {
            self.constraints.iter().find(|c| {
                c.kind() == *kind && !matches!(c, Constraint::DeliverWith(ids) if ids.is_empty())
            })
        })
    }

    /// Rank of the primary constraint in the priority table.
    pub fn priority_rank(&self) -> Option<usize> {
        let kind = self.primary_constraint()?.kind();
        CONSTRAINT_PRIORITY.iter().position(|k| *k == kind)
    }

    pub fn vehicle(&self) -> Option<VehicleId> {
        match self.placement {
            Placement::Vehicle(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.placement == Placement::Held
    }

    pub fn is_unassigned(&self) -> bool {
        self.placement == Placement::Unassigned
    }

    /// Delivered strictly after the deadline. Equal to the deadline is on time.
    ///
    /// ```
    /// use parcel_dispatch::domain::{Address, Parcel};
    ///
    /// let mut parcel = Parcel::new(1, Address::new("1 A St", "X", "UT", "1")).with_deadline(9 * 3600);
    /// parcel.delivered_at = Some(9 * 3600);
    /// assert!(!parcel.is_late());
    /// parcel.delivered_at = Some(9 * 3600 + 1);
    /// assert!(parcel.is_late());
    /// ```
    pub fn is_late(&self) -> bool {
        match (self.deadline, self.delivered_at) {
            (Some(deadline), Some(delivered)) => delivered > deadline,
            _ => false,
        }
    }
}

/// One stop of a route: a parcel delivered at a street address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub parcel: ParcelId,
    pub address: String,
}

impl Stop {
    pub fn new(parcel: ParcelId, address: impl Into<String>) -> Self {
        Self {
            parcel,
            address: address.into(),
        }
    }
}

/// A delivery vehicle.
///
/// The manifest is the set of loaded parcels in load order; the route is the visiting
/// order built from it. After routing, every manifest parcel appears exactly once in
/// the route.
///
/// ```
/// use parcel_dispatch::domain::Vehicle;
///
/// let truck = Vehicle::new(1, 16, 18.0, "4001 South 700 E").with_start_time(8 * 3600);
/// assert!(truck.manifest.is_empty());
/// assert_eq!(truck.current_location, "4001 South 700 E");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: VehicleId,
    pub capacity: usize,
    /// Distance units per hour.
    pub speed: f64,
    pub depot: String,
    pub start_time: Seconds,
    pub manifest: Vec<ParcelId>,
    pub route: Vec<Stop>,
    pub total_distance: f64,
    pub current_location: String,
    pub current_time: Seconds,
    pub return_time: Option<Seconds>,
    /// Arrival time -> address reached.
    pub location_log: BTreeMap<Seconds, String>,
}

impl Vehicle {
    pub fn new(id: VehicleId, capacity: usize, speed: f64, depot: impl Into<String>) -> Self {
        let depot = depot.into();
        Self {
            id,
            capacity,
            speed,
            current_location: depot.clone(),
            depot,
            start_time: 8 * 3600,
            manifest: Vec::new(),
            route: Vec::new(),
            total_distance: 0.0,
            current_time: 8 * 3600,
            return_time: None,
            location_log: BTreeMap::new(),
        }
    }

    pub fn with_start_time(mut self, start_time: Seconds) -> Self {
        self.start_time = start_time;
        self.current_time = start_time;
        self
    }

    pub fn carries(&self, parcel: ParcelId) -> bool {
        self.manifest.contains(&parcel)
    }

    /// Parcel ids in visiting order.
    pub fn route_ids(&self) -> Vec<ParcelId> {
        self.route.iter().map(|stop| stop.parcel).collect()
    }

    /// Clears route and timing state, keeping the manifest.
    pub fn reset_route(&mut self) {
        self.route.clear();
        self.total_distance = 0.0;
        self.current_location = self.depot.clone();
        self.current_time = self.start_time;
        self.return_time = None;
        self.location_log.clear();
    }

    /// The last address reached at or before `time`, or the depot before departure.
    pub fn location_at(&self, time: Seconds) -> &str {
        self.location_log
            .range(..=time)
            .next_back()
            .map(|(_, address)| address.as_str())
            .unwrap_or(self.depot.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(street: &str) -> Address {
        Address::new(street, "Salt Lake City", "UT", "84101")
    }

    #[test]
    fn test_primary_constraint_follows_priority_table() {
        let parcel = Parcel::new(9, address("300 State St"))
            .with_constraint(Constraint::DeliverWith([1, 2].into_iter().collect()))
            .with_constraint(Constraint::DelayedUntil(10 * 3600))
            .with_constraint(Constraint::Flagged);

        assert_eq!(parcel.primary_constraint(), Some(&Constraint::Flagged));
        assert_eq!(parcel.priority_rank(), Some(0));
    }

    #[test]
    fn test_empty_deliver_with_is_unconstrained() {
        let parcel = Parcel::new(1, address("1 A St")).with_constraint(Constraint::DeliverWith(BTreeSet::new()));

        assert!(!parcel.is_constrained());
        assert!(parcel.primary_constraint().is_none());
    }

    #[test]
    fn test_set_constraint_replaces_same_kind() {
        let mut parcel = Parcel::new(1, address("1 A St")).with_constraint(Constraint::RequiredVehicle(1));
        parcel.set_constraint(Constraint::RequiredVehicle(2));

        assert_eq!(parcel.constraints.len(), 1);
        assert_eq!(parcel.required_vehicle(), Some(2));
    }

    #[test]
    fn test_location_at_uses_latest_entry_not_after_time() {
        let mut truck = Vehicle::new(1, 16, 18.0, "Depot").with_start_time(8 * 3600);
        truck.location_log.insert(8 * 3600, "Depot".to_string());
        truck.location_log.insert(8 * 3600 + 600, "A".to_string());
        truck.location_log.insert(8 * 3600 + 1200, "B".to_string());

        assert_eq!(truck.location_at(7 * 3600), "Depot");
        assert_eq!(truck.location_at(8 * 3600 + 900), "A");
        assert_eq!(truck.location_at(8 * 3600 + 1200), "B");
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(matches!(
            parse_time_of_day("noon-ish"),
            Err(DispatchError::InvalidTimeInput(_))
        ));
    }
}
