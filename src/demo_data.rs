//! Built-in demo datasets.
//!
//! - `SALT_LAKE`: 40 parcels over 27 metro addresses, with every kind of delivery note
//!   (delayed flights, fixed trucks, co-delivery groups and one wrong address)
//! - `SCENARIO`: 6 parcels exercising each constraint once
//!
//! Both share one address table. Distances are derived from planar coordinates
//! (straight line plus 20% for the street grid, rounded to a tenth) and stored as a
//! lower-triangular table, the same shape the CSV distance files use. Parcel weights
//! come from a seeded generator so the data is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{IngestConfig, DEFAULT_DEPOT};
use crate::distance::DistanceMatrix;
use crate::domain::{Address, Constraint, Parcel};
use crate::error::DispatchError;
use crate::ingest::{read_parcels, Dataset};

/// Street address with planar coordinates in distance units.
struct AddressData {
    street: &'static str,
    x: f64,
    y: f64,
}

/// Street grid detour factor applied to straight-line distances.
const DETOUR: f64 = 1.2;

// ============================================================================
// Salt Lake metro addresses
// ============================================================================

const ADDRESSES: &[AddressData] = &[
    AddressData { street: DEFAULT_DEPOT, x: 0.0, y: 0.0 },
    AddressData { street: "1060 Dalton Ave S", x: -6.0, y: 3.5 },
    AddressData { street: "1330 2100 S", x: -2.0, y: 1.0 },
    AddressData { street: "1488 4800 S", x: -5.0, y: -2.0 },
    AddressData { street: "177 W Price Ave", x: -3.0, y: -0.5 },
    AddressData { street: "195 W Oakland Ave", x: -3.2, y: 1.5 },
    AddressData { street: "2010 W 500 S", x: -7.0, y: 5.0 },
    AddressData { street: "2300 Parkway Blvd", x: -9.0, y: 0.5 },
    AddressData { street: "233 Canyon Rd", x: -2.5, y: 8.0 },
    AddressData { street: "2530 S 500 E", x: -0.5, y: 2.0 },
    AddressData { street: "2600 Taylorsville Blvd", x: -9.5, y: -3.0 },
    AddressData { street: "2835 Main St", x: -2.8, y: 1.8 },
    AddressData { street: "300 State St", x: -2.2, y: 6.5 },
    AddressData { street: "3060 Lester St", x: -8.5, y: 1.0 },
    AddressData { street: "3148 S 1100 W", x: -5.5, y: 1.0 },
    AddressData { street: "3365 S 900 W", x: -4.8, y: 0.8 },
    AddressData { street: "3575 W Valley Central Station bus Loop", x: -10.5, y: 0.0 },
    AddressData { street: "3595 Main St", x: -3.0, y: 0.6 },
    AddressData { street: "380 W 2880 S", x: -3.8, y: 1.6 },
    AddressData { street: "410 S State St", x: -2.1, y: 5.8 },
    AddressData { street: "4300 S 1300 E", x: 1.5, y: -0.5 },
    AddressData { street: "4580 S 2300 E", x: 4.0, y: -1.0 },
    AddressData { street: "5025 State St", x: -2.5, y: -2.0 },
    AddressData { street: "5100 South 2700 West", x: -7.5, y: -2.5 },
    AddressData { street: "5383 South 900 East #104", x: 0.5, y: -2.5 },
    AddressData { street: "600 E 900 South", x: -0.3, y: 5.0 },
    AddressData { street: "6351 South 900 East", x: 0.6, y: -4.5 },
];

// ============================================================================
// Salt Lake parcels: id, street, city, state, zip, deadline, weight, notes
// ============================================================================

const SALT_LAKE_PARCELS: &str = r#"1,195 W Oakland Ave,Salt Lake City,UT,84115,10:30 AM,,
2,2530 S 500 E,Salt Lake City,UT,84106,EOD,,
3,233 Canyon Rd,Salt Lake City,UT,84103,EOD,,Can only be on truck 2
4,380 W 2880 S,Salt Lake City,UT,84115,EOD,,
5,410 S State St,Salt Lake City,UT,84111,EOD,,
6,3060 Lester St,West Valley City,UT,84119,EOD,,Delayed on flight---will not arrive to depot until 9:05 am
7,1330 2100 S,Salt Lake City,UT,84106,EOD,,
8,300 State St,Salt Lake City,UT,84103,EOD,,
9,300 State St,Salt Lake City,UT,84103,EOD,,Wrong address listed
10,600 E 900 South,Salt Lake City,UT,84105,EOD,,
11,2600 Taylorsville Blvd,Salt Lake City,UT,84118,EOD,,
12,3575 W Valley Central Station bus Loop,West Valley City,UT,84119,EOD,,
13,2010 W 500 S,Salt Lake City,UT,84104,10:30 AM,,
14,4300 S 1300 E,Millcreek,UT,84117,10:30 AM,,"Must be delivered with 15, 19"
15,4580 S 2300 E,Holladay,UT,84117,9:00 AM,,
16,4580 S 2300 E,Holladay,UT,84117,10:30 AM,,"Must be delivered with 13, 19"
17,3148 S 1100 W,Salt Lake City,UT,84119,EOD,,
18,1488 4800 S,Salt Lake City,UT,84123,EOD,,Can only be on truck 2
19,177 W Price Ave,Salt Lake City,UT,84115,EOD,,
20,3595 Main St,Salt Lake City,UT,84115,10:30 AM,,"Must be delivered with 13, 15"
21,3595 Main St,Salt Lake City,UT,84115,EOD,,
22,6351 South 900 East,Murray,UT,84121,EOD,,
23,5100 South 2700 West,Salt Lake City,UT,84118,EOD,,
24,5025 State St,Murray,UT,84107,EOD,,
25,5383 South 900 East #104,Salt Lake City,UT,84117,EOD,,Delayed on flight---will not arrive to depot until 9:05 am
26,5383 South 900 East #104,Salt Lake City,UT,84117,EOD,,
27,1060 Dalton Ave S,Salt Lake City,UT,84104,EOD,,
28,2835 Main St,Salt Lake City,UT,84115,EOD,,Delayed on flight---will not arrive to depot until 9:05 am
29,1330 2100 S,Salt Lake City,UT,84106,10:30 AM,,
30,300 State St,Salt Lake City,UT,84103,10:30 AM,,
31,3365 S 900 W,Salt Lake City,UT,84119,10:30 AM,,
32,3365 S 900 W,Salt Lake City,UT,84119,EOD,,Delayed on flight---will not arrive to depot until 9:05 am
33,2530 S 500 E,Salt Lake City,UT,84106,EOD,,
34,4580 S 2300 E,Holladay,UT,84117,10:30 AM,,
35,1060 Dalton Ave S,Salt Lake City,UT,84104,EOD,,
36,2300 Parkway Blvd,West Valley City,UT,84119,EOD,,Can only be on truck 2
37,410 S State St,Salt Lake City,UT,84111,10:30 AM,,
38,410 S State St,Salt Lake City,UT,84111,EOD,,Can only be on truck 2
39,2010 W 500 S,Salt Lake City,UT,84104,EOD,,
40,380 W 2880 S,Salt Lake City,UT,84115,10:30 AM,,
"#;

/// Builds the shared distance model from [`ADDRESSES`].
fn metro_distances() -> Result<DistanceMatrix, DispatchError> {
    let streets: Vec<String> = ADDRESSES.iter().map(|a| a.street.to_string()).collect();
    let table: Vec<Vec<Option<f64>>> = ADDRESSES
        .iter()
        .enumerate()
        .map(|(i, from)| {
            ADDRESSES[..=i]
                .iter()
                .map(|to| {
                    let straight = (from.x - to.x).hypot(from.y - to.y);
                    Some((straight * DETOUR * 10.0).round() / 10.0)
                })
                .collect()
        })
        .collect();
    DistanceMatrix::from_table(streets, &table)
}

/// Seeded weights in kilograms.
fn assign_weights(parcels: &mut [Parcel], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for parcel in parcels {
        parcel.weight = rng.gen_range(1..=88) as f64;
    }
}

/// Generates the Salt Lake metro dataset (40 parcels).
///
/// # Examples
///
/// ```
/// use parcel_dispatch::demo_data::generate_salt_lake;
///
/// let dataset = generate_salt_lake().unwrap();
/// assert_eq!(dataset.name, "SALT_LAKE");
/// assert_eq!(dataset.parcels.len(), 40);
/// assert_eq!(dataset.distances.len(), 27);
/// ```
pub fn generate_salt_lake() -> Result<Dataset, DispatchError> {
    let mut parcels = read_parcels(SALT_LAKE_PARCELS.as_bytes(), &IngestConfig::default())?;
    assign_weights(&mut parcels, 42);
    Ok(Dataset::new("SALT_LAKE", parcels, metro_distances()?))
}

/// Generates the six-parcel scenario.
///
/// - P1: wrong address, held until 09:05
/// - P2: only on vehicle 2
/// - P3, P4: delivered together
/// - P5, P6: same address, P5 due by 10:30
pub fn generate_scenario() -> Result<Dataset, DispatchError> {
    let city = |street: &str| Address::new(street, "Salt Lake City", "UT", "84115");
    let mut parcels = vec![
        Parcel::new(1, Address::new("Address pending", "N/A", "N/A", "N/A"))
            .with_notes("Wrong address listed")
            .with_constraint(Constraint::Flagged)
            .with_constraint(Constraint::DelayedUntil(9 * 3600 + 5 * 60)),
        Parcel::new(2, city("233 Canyon Rd"))
            .with_notes("Can only be on truck 2")
            .with_constraint(Constraint::RequiredVehicle(2)),
        Parcel::new(3, city("1060 Dalton Ave S")).with_constraint(Constraint::DeliverWith([4].into())),
        Parcel::new(4, city("2010 W 500 S")).with_constraint(Constraint::DeliverWith([3].into())),
        Parcel::new(5, city("2835 Main St")).with_deadline(10 * 3600 + 30 * 60),
        Parcel::new(6, city("2835 Main St")),
    ];
    assign_weights(&mut parcels, 7);
    Ok(Dataset::new("SCENARIO", parcels, metro_distances()?))
}

/// Returns all available demo dataset names.
pub fn available_datasets() -> &'static [&'static str] {
    &["SALT_LAKE", "SCENARIO"]
}

/// Generates demo data by name.
///
/// # Examples
///
/// ```
/// use parcel_dispatch::demo_data::generate_by_name;
///
/// let dataset = generate_by_name("scenario").unwrap();
/// assert_eq!(dataset.parcels.len(), 6);
///
/// assert!(generate_by_name("UNKNOWN").is_err());
/// ```
pub fn generate_by_name(name: &str) -> Result<Dataset, DispatchError> {
    match name.to_uppercase().as_str() {
        "SALT_LAKE" => generate_salt_lake(),
        "SCENARIO" => generate_scenario(),
        _ => Err(DispatchError::UnknownDataset(name.to_string())),
    }
}
