//! Converters between domain models and DTOs.

use crate::correction::ParcelSnapshot;
use crate::domain::{format_time_of_day, Address, Parcel, Seconds, CONSTRAINT_PRIORITY};
use crate::dto::{AddressDto, DatasetDto, ParcelDto, ParcelStatusDto, PlanDto, VehiclePlanDto};
use crate::ingest::Dataset;
use crate::planner::{PlanQuality, VehiclePlan};
use crate::repair::RepairOutcome;
use crate::service::DispatchJob;

/// Deadline label: `HH:MM:SS`, or `EOD` when the parcel has none.
///
/// ```
/// use parcel_dispatch::converters::deadline_label;
///
/// assert_eq!(deadline_label(Some(10 * 3600 + 30 * 60)), "10:30:00");
/// assert_eq!(deadline_label(None), "EOD");
/// ```
pub fn deadline_label(deadline: Option<Seconds>) -> String {
    deadline.map_or_else(|| "EOD".to_string(), format_time_of_day)
}

impl From<&Address> for AddressDto {
    fn from(address: &Address) -> Self {
        Self {
            street: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            zip: address.zip.clone(),
        }
    }
}

impl From<&Parcel> for ParcelDto {
    fn from(parcel: &Parcel) -> Self {
        let constraints = CONSTRAINT_PRIORITY
            .iter()
            .filter(|kind| parcel.constraints.iter().any(|c| c.kind() == **kind))
            .map(|kind| kind.as_str().to_string())
            .collect();
        Self {
            id: parcel.id,
            address: AddressDto::from(&parcel.address),
            deadline: deadline_label(parcel.deadline),
            weight: parcel.weight,
            notes: parcel.notes.clone(),
            constraints,
        }
    }
}

impl DatasetDto {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            name: dataset.name.clone(),
            parcels: dataset.parcels.iter().map(ParcelDto::from).collect(),
            addresses: dataset.distances.addresses().to_vec(),
        }
    }
}

impl From<&VehiclePlan> for VehiclePlanDto {
    fn from(plan: &VehiclePlan) -> Self {
        Self {
            id: plan.id,
            manifest: plan.manifest.clone(),
            route: plan.route.clone(),
            total_distance: plan.total_distance,
            start_time: format_time_of_day(plan.start_time),
            return_time: plan.return_time.map(format_time_of_day),
            final_location: plan.final_location.clone(),
            repair: plan.repair.as_ref().map(|outcome| match outcome {
                RepairOutcome::Clean { .. } => "CLEAN".to_string(),
                RepairOutcome::Exhausted { .. } => "EXHAUSTED".to_string(),
            }),
        }
    }
}

impl PlanDto {
    /// Builds the response for `job`. A job that has not been planned yet has an
    /// empty plan.
    pub fn from_job(job: &DispatchJob) -> Self {
        let dataset = job.dispatcher.dataset().name.clone();
        let Some(summary) = &job.summary else {
            return Self {
                id: job.id.clone(),
                dataset,
                status: job.status.as_str().to_string(),
                total_distance: 0.0,
                vehicles: Vec::new(),
                held: Vec::new(),
                unassigned: Vec::new(),
                late: Vec::new(),
                reoptimized: false,
                quality: None,
                diagnostics: Vec::new(),
                error: job.error.clone(),
            };
        };

        Self {
            id: job.id.clone(),
            dataset,
            status: job.status.as_str().to_string(),
            total_distance: summary.total_distance,
            vehicles: summary.vehicles.iter().map(VehiclePlanDto::from).collect(),
            held: summary.held.clone(),
            unassigned: summary.unassigned.clone(),
            late: summary.late.clone(),
            reoptimized: summary.reoptimized,
            quality: Some(
                match summary.quality {
                    PlanQuality::Feasible => "FEASIBLE",
                    PlanQuality::DeadlinesMissed => "DEADLINES_MISSED",
                }
                .to_string(),
            ),
            diagnostics: summary
                .diagnostics
                .iter()
                .filter_map(|d| serde_json::to_value(d).ok())
                .collect(),
            error: job.error.clone(),
        }
    }
}

impl From<&ParcelSnapshot> for ParcelStatusDto {
    fn from(snapshot: &ParcelSnapshot) -> Self {
        Self {
            id: snapshot.id,
            address: snapshot.address.full(),
            deadline: deadline_label(snapshot.deadline),
            weight: snapshot.weight,
            notes: snapshot.notes.clone(),
            time: format_time_of_day(snapshot.time),
            status: snapshot.status.as_str().to_string(),
            vehicle: snapshot.vehicle,
            location: snapshot.location.clone(),
            delivered_at: snapshot
                .delivered_at
                .filter(|at| *at <= snapshot.time)
                .map(format_time_of_day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::demo_data::generate_scenario;
    use crate::planner::Dispatcher;

    #[test]
    fn test_parcel_dto_lists_constraints_in_priority_order() {
        let dataset = generate_scenario().unwrap();
        let dto = ParcelDto::from(&dataset.parcels[0]);
        assert_eq!(dto.constraints, vec!["FLAGGED", "DELAYED"]);
        assert_eq!(dto.deadline, "EOD");
    }

    #[test]
    fn test_plan_dto_from_unplanned_job() {
        let dispatcher = Dispatcher::new(generate_scenario().unwrap(), DispatchConfig::default()).unwrap();
        let job = DispatchJob::new("j".to_string(), dispatcher);
        let dto = PlanDto::from_job(&job);
        assert_eq!(dto.status, "NOT_PLANNED");
        assert!(dto.vehicles.is_empty());
        assert!(dto.quality.is_none());
    }

    #[test]
    fn test_plan_dto_from_planned_job() {
        let dispatcher = Dispatcher::new(generate_scenario().unwrap(), DispatchConfig::default()).unwrap();
        let mut job = DispatchJob::new("j".to_string(), dispatcher);
        job.plan().unwrap();

        let dto = PlanDto::from_job(&job);
        assert_eq!(dto.status, "PLANNED");
        assert_eq!(dto.vehicles.len(), 3);
        assert_eq!(dto.held, vec![1]);
        assert_eq!(dto.vehicles[0].start_time, "08:00:00");
    }
}
