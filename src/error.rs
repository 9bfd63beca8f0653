//! Error and diagnostic types.
//!
//! Two kinds of failure exist:
//!
//! - [`DispatchError`]: hard errors returned through `Result` (bad input, unknown ids).
//!   The caller's state is left unchanged.
//! - [`Diagnostic`]: plan-quality problems found while planning. They never abort the
//!   run; they are collected in [`Diagnostics`] and surfaced with the plan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::domain::{ParcelId, VehicleId};

/// Hard errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid time of day '{0}', expected HH:MM:SS")]
    InvalidTimeInput(String),

    #[error("parcel {0} not found")]
    UnknownParcel(ParcelId),

    #[error("dataset '{0}' not found")]
    UnknownDataset(String),

    #[error("plan job '{0}' not found")]
    UnknownJob(String),

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A plan-quality problem surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Diagnostic {
    /// No vehicle had room for the parcel.
    UnassignableParcel { parcel: ParcelId },
    /// A co-delivery group does not fit on any single vehicle.
    CapacityExceededGroup { parcel: ParcelId, group: Vec<ParcelId> },
    /// A distance lookup referenced an address missing from the distance table.
    UnknownAddress { address: String },
    /// The deadline repair loop hit its pass cap with late parcels remaining.
    RepairExhausted { vehicle: VehicleId, late: Vec<ParcelId> },
    /// A constrained parcel was found already loaded when pass 1 reached it.
    AlreadyAssigned { parcel: ParcelId, vehicle: VehicleId },
    /// A corrected parcel fit neither its group's vehicle nor the correction vehicle.
    CorrectionUnplaced { parcel: ParcelId, vehicle: VehicleId },
    /// A corrected parcel could not join the vehicle carrying its co-delivery group.
    CoDeliverySplit {
        parcel: ParcelId,
        vehicle: VehicleId,
        group_vehicle: VehicleId,
    },
    /// Deadlines are still violated after fleet re-optimization.
    PlanQualityFailure { late: Vec<ParcelId> },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnassignableParcel { parcel } => {
                write!(f, "unable to load parcel {}: all vehicles may be full", parcel)
            }
            Diagnostic::CapacityExceededGroup { parcel, group } => write!(
                f,
                "co-delivery group of parcel {} ({} parcels) does not fit on any vehicle",
                parcel,
                group.len()
            ),
            Diagnostic::UnknownAddress { address } => {
                write!(f, "address '{}' is not in the distance table", address)
            }
            Diagnostic::RepairExhausted { vehicle, late } => write!(
                f,
                "vehicle {} still has {} late parcel(s) after route repair",
                vehicle,
                late.len()
            ),
            Diagnostic::AlreadyAssigned { parcel, vehicle } => {
                write!(f, "parcel {} is already on vehicle {}", parcel, vehicle)
            }
            Diagnostic::CorrectionUnplaced { parcel, vehicle } => write!(
                f,
                "corrected parcel {} does not fit on vehicle {}; kept in hold",
                parcel, vehicle
            ),
            Diagnostic::CoDeliverySplit {
                parcel,
                vehicle,
                group_vehicle,
            } => write!(
                f,
                "corrected parcel {} rides vehicle {}, apart from its co-delivery group on vehicle {}",
                parcel, vehicle, group_vehicle
            ),
            Diagnostic::PlanQualityFailure { late } => write!(
                f,
                "plan misses {} deadline(s) after re-optimization: {:?}",
                late.len(),
                late
            ),
        }
    }
}

/// Ordered list of diagnostics recorded during a run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    unknown_addresses: BTreeSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and emits it as a warning.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if let Diagnostic::UnknownAddress { address } = &diagnostic {
            if !self.unknown_addresses.insert(address.clone()) {
                return;
            }
        }
        warn!(diagnostic = %diagnostic, "Plan diagnostic");
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.unknown_addresses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_address_recorded_once() {
        let mut diagnostics = Diagnostics::new();
        for _ in 0..3 {
            diagnostics.push(Diagnostic::UnknownAddress {
                address: "1 Nowhere Ln".to_string(),
            });
        }
        diagnostics.push(Diagnostic::UnassignableParcel { parcel: 7 });
        diagnostics.push(Diagnostic::UnassignableParcel { parcel: 7 });

        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_diagnostic_serializes_with_kind_tag() {
        let json = serde_json::to_value(Diagnostic::RepairExhausted {
            vehicle: 3,
            late: vec![25],
        })
        .unwrap();

        assert_eq!(json["kind"], "REPAIR_EXHAUSTED");
        assert_eq!(json["vehicle"], 3);
    }
}
