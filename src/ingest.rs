//! Input loading.
//!
//! Three headerless CSV tables feed a [`Dataset`]:
//!
//! - parcels: `id, street, city, state, zip, deadline, weight, notes`
//! - addresses: `index, street, ...` (only the street is used)
//! - distances: one row per address, positional cells, blanks allowed
//!
//! Free-text notes are turned into [`Constraint`]s by [`apply_notes`].

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::distance::DistanceMatrix;
use crate::domain::{parse_deadline, parse_time_of_day, Address, Constraint, Parcel, ParcelId, VehicleId};
use crate::error::DispatchError;

/// Everything a planning run consumes.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub parcels: Vec<Parcel>,
    pub distances: DistanceMatrix,
}

impl Dataset {
    pub fn new(name: impl Into<String>, parcels: Vec<Parcel>, distances: DistanceMatrix) -> Self {
        Self {
            name: name.into(),
            parcels,
            distances,
        }
    }

    /// Reads the three tables from any byte sources.
    pub fn from_readers(
        name: impl Into<String>,
        parcels: impl Read,
        addresses: impl Read,
        distances: impl Read,
        ingest: &IngestConfig,
    ) -> Result<Self, DispatchError> {
        let parcels = read_parcels(parcels, ingest)?;
        let addresses = read_addresses(addresses)?;
        let table = read_distance_rows(distances)?;
        let distances = DistanceMatrix::from_table(addresses, &table)?;
        let dataset = Self::new(name, parcels, distances);
        info!(
            dataset = %dataset.name,
            parcels = dataset.parcels.len(),
            addresses = dataset.distances.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    pub fn from_paths(
        parcels: impl AsRef<Path>,
        addresses: impl AsRef<Path>,
        distances: impl AsRef<Path>,
        ingest: &IngestConfig,
    ) -> Result<Self, DispatchError> {
        let name = parcels
            .as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        Self::from_readers(
            name,
            File::open(parcels)?,
            File::open(addresses)?,
            File::open(distances)?,
            ingest,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ParcelRecord {
    id: ParcelId,
    street: String,
    city: String,
    state: String,
    zip: String,
    deadline: Option<String>,
    weight: Option<f64>,
    notes: Option<String>,
}

fn reader_for<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source)
}

/// Reads parcel rows and applies their notes.
///
/// ```
/// use parcel_dispatch::config::IngestConfig;
/// use parcel_dispatch::ingest::read_parcels;
///
/// let rows = "\
/// 1,195 W Oakland Ave,Salt Lake City,UT,84115,10:30 AM,21,
/// 3,233 Canyon Rd,Salt Lake City,UT,84103,EOD,2,Can only be on truck 2
/// ";
/// let parcels = read_parcels(rows.as_bytes(), &IngestConfig::default()).unwrap();
///
/// assert_eq!(parcels.len(), 2);
/// assert_eq!(parcels[0].deadline, Some(10 * 3600 + 30 * 60));
/// assert_eq!(parcels[1].required_vehicle(), Some(2));
/// ```
pub fn read_parcels<R: Read>(source: R, ingest: &IngestConfig) -> Result<Vec<Parcel>, DispatchError> {
    let mut reader = reader_for(source);
    let mut parcels = Vec::new();
    let mut seen = BTreeSet::new();

    for result in reader.deserialize::<ParcelRecord>() {
        let record = result?;
        let line = parcels.len() as u64 + 1;
        if !seen.insert(record.id) {
            return Err(DispatchError::MalformedRecord {
                line,
                reason: format!("duplicate parcel id {}", record.id),
            });
        }
        let deadline = parse_deadline(record.deadline.as_deref().unwrap_or_default()).map_err(|e| {
            DispatchError::MalformedRecord {
                line,
                reason: e.to_string(),
            }
        })?;

        let mut parcel = Parcel::new(
            record.id,
            Address::new(record.street, record.city, record.state, record.zip),
        )
        .with_weight(record.weight.unwrap_or_default())
        .with_notes(record.notes.unwrap_or_default());
        parcel.deadline = deadline;

        apply_notes(&mut parcel, ingest).map_err(|reason| DispatchError::MalformedRecord { line, reason })?;
        parcels.push(parcel);
    }

    debug!(count = parcels.len(), "Parcel rows read");
    Ok(parcels)
}

/// Reads the address list; the street is the second column.
pub fn read_addresses<R: Read>(source: R) -> Result<Vec<String>, DispatchError> {
    let mut reader = reader_for(source);
    let mut addresses = Vec::new();
    for result in reader.records() {
        let record = result?;
        let street = record.get(1).filter(|s| !s.is_empty()).ok_or_else(|| DispatchError::MalformedRecord {
            line: record.position().map_or(0, |p| p.line()),
            reason: "address row has no street column".to_string(),
        })?;
        addresses.push(street.to_string());
    }
    Ok(addresses)
}

/// Reads positional distance rows. Blank cells come back as `None`.
pub fn read_distance_rows<R: Read>(source: R) -> Result<Vec<Vec<Option<f64>>>, DispatchError> {
    let mut reader = reader_for(source);
    let mut rows = Vec::new();
    for result in reader.deserialize::<Vec<Option<f64>>>() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Turns a parcel's free-text notes into constraints.
///
/// Recognized markers: `Delayed on ...` (optionally `until <time>`), `Can only be on
/// truck N`, `Wrong address listed` and `Must be delivered with a, b, ...`. Unknown
/// text is kept as notes only. Errors carry the reason for the caller to attach a
/// line number.
///
/// ```
/// use parcel_dispatch::config::IngestConfig;
/// use parcel_dispatch::domain::{Address, Parcel};
/// use parcel_dispatch::ingest::apply_notes;
///
/// let mut parcel = Parcel::new(9, Address::new("300 State St", "Salt Lake City", "UT", "84103"))
///     .with_notes("Wrong address listed");
/// apply_notes(&mut parcel, &IngestConfig::default()).unwrap();
///
/// assert!(parcel.is_flagged());
/// assert_eq!(parcel.delayed_until(), Some(10 * 3600 + 20 * 60));
/// ```
pub fn apply_notes(parcel: &mut Parcel, ingest: &IngestConfig) -> Result<(), String> {
    let notes = parcel.notes.clone();
    let lower = notes.to_lowercase();

    if lower.contains("delayed on") {
        let explicit = lower
            .split_once("until")
            .map(|(_, rest)| rest.trim())
            .and_then(|time| parse_time_of_day(time).ok());
        let until = match explicit {
            Some(time) => time,
            None => parse_time_of_day(&ingest.delayed_arrival).map_err(|e| e.to_string())?,
        };
        parcel.set_constraint(Constraint::DelayedUntil(until));
    }

    if lower.contains("can only be on") {
        let vehicle = lower
            .split_once("truck")
            .map(|(_, rest)| rest.trim())
            .and_then(|number| number.parse::<VehicleId>().ok())
            .ok_or_else(|| format!("cannot read vehicle number from '{}'", notes))?;
        parcel.set_constraint(Constraint::RequiredVehicle(vehicle));
    }

    if lower.contains("wrong address") {
        let update = parse_time_of_day(&ingest.address_update_time).map_err(|e| e.to_string())?;
        parcel.address = Address::new(
            format!("Incorrect address. Will be updated at {}", ingest.address_update_time),
            "N/A",
            "N/A",
            "N/A",
        );
        parcel.set_constraint(Constraint::DelayedUntil(update));
        parcel.set_constraint(Constraint::Flagged);
    }

    if lower.contains("must be delivered") {
        let ids = lower
            .split_once("with")
            .map(|(_, rest)| rest)
            .ok_or_else(|| format!("no sibling list in '{}'", notes))?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ParcelId>().map_err(|_| format!("bad sibling id '{}'", s)))
            .collect::<Result<BTreeSet<_>, _>>()?;
        let ids: BTreeSet<ParcelId> = ids.into_iter().filter(|id| *id != parcel.id).collect();
        if !ids.is_empty() {
            parcel.set_constraint(Constraint::DeliverWith(ids));
        }
    }

    Ok(())
}
