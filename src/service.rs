//! Dispatch service: a registry of planning jobs.
//!
//! Each job owns a [`Dispatcher`]. Planning and status queries take the job's write
//! lock for their whole duration, so a query never observes a half-built plan.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::console;
use crate::correction::ParcelSnapshot;
use crate::domain::ParcelId;
use crate::error::DispatchError;
use crate::ingest::Dataset;
use crate::planner::{Dispatcher, PlanSummary};

/// Status of a planning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// Created, no plan yet.
    NotPlanned,
    /// A planning run is in progress.
    Planning,
    /// The plan is ready for queries.
    Planned,
    /// The last planning run returned an error.
    Failed,
}

impl PlanStatus {
    /// Returns the status as a SCREAMING_SNAKE_CASE string for API responses.
    ///
    /// ```
    /// use parcel_dispatch::service::PlanStatus;
    ///
    /// assert_eq!(PlanStatus::NotPlanned.as_str(), "NOT_PLANNED");
    /// assert_eq!(PlanStatus::Planned.as_str(), "PLANNED");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::NotPlanned => "NOT_PLANNED",
            PlanStatus::Planning => "PLANNING",
            PlanStatus::Planned => "PLANNED",
            PlanStatus::Failed => "FAILED",
        }
    }
}

/// A planning job with its current state.
pub struct DispatchJob {
    /// Unique job identifier.
    pub id: String,
    /// Current status.
    pub status: PlanStatus,
    /// Planner over the job's dataset.
    pub dispatcher: Dispatcher,
    /// Result of the last successful run.
    pub summary: Option<PlanSummary>,
    /// Error message of the last failed run.
    pub error: Option<String>,
}

impl DispatchJob {
    pub fn new(id: String, dispatcher: Dispatcher) -> Self {
        Self {
            id,
            status: PlanStatus::NotPlanned,
            dispatcher,
            summary: None,
            error: None,
        }
    }

    /// Runs the planner, printing progress to the console.
    pub fn plan(&mut self) -> Result<PlanSummary, DispatchError> {
        self.status = PlanStatus::Planning;
        let started = Instant::now();
        let dataset = self.dispatcher.dataset();
        console::print_config(
            &dataset.name,
            self.dispatcher.config().vehicle_count,
            dataset.parcels.len(),
            dataset.distances.len(),
        );
        info!(job_id = %self.id, dataset = %dataset.name, "Starting planning run");

        match self.dispatcher.plan() {
            Ok(summary) => {
                console::print_plan_ended(started.elapsed(), &summary);
                info!(
                    job_id = %self.id,
                    duration_secs = started.elapsed().as_secs_f64(),
                    total_distance = summary.total_distance,
                    late = summary.late.len(),
                    "Planning run complete"
                );
                self.status = PlanStatus::Planned;
                self.summary = Some(summary.clone());
                self.error = None;
                Ok(summary)
            }
            Err(e) => {
                warn!(job_id = %self.id, error = %e, "Planning run failed");
                self.status = PlanStatus::Failed;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Plans first if no plan exists yet.
    fn ensure_planned(&mut self) -> Result<(), DispatchError> {
        if self.status != PlanStatus::Planned {
            self.plan()?;
        }
        Ok(())
    }

    /// Every parcel's status at `time`. Due corrections are applied first and the
    /// cached summary is refreshed with them.
    pub fn status_at(&mut self, time: &str) -> Result<Vec<ParcelSnapshot>, DispatchError> {
        self.ensure_planned()?;
        let snapshots = self.dispatcher.status_at(time)?;
        self.summary = Some(self.dispatcher.summary());
        Ok(snapshots)
    }

    /// One parcel's status at `time`.
    pub fn parcel_status_at(&mut self, parcel: ParcelId, time: &str) -> Result<ParcelSnapshot, DispatchError> {
        self.ensure_planned()?;
        let snapshot = self.dispatcher.parcel_status_at(parcel, time)?;
        self.summary = Some(self.dispatcher.summary());
        Ok(snapshot)
    }
}

/// Manages planning jobs.
///
/// # Examples
///
/// ```
/// use parcel_dispatch::config::DispatchConfig;
/// use parcel_dispatch::demo_data::generate_scenario;
/// use parcel_dispatch::service::{DispatchService, PlanStatus};
///
/// let service = DispatchService::new();
/// let dataset = generate_scenario().unwrap();
///
/// // Create a job (doesn't plan yet)
/// let job = service.create_job("test-1".to_string(), dataset, DispatchConfig::default()).unwrap();
/// assert_eq!(job.read().status, PlanStatus::NotPlanned);
/// ```
pub struct DispatchService {
    jobs: RwLock<HashMap<String, Arc<RwLock<DispatchJob>>>>,
}

impl DispatchService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a job for `dataset`. Fails if `config` is invalid.
    pub fn create_job(
        &self,
        id: String,
        dataset: Dataset,
        config: DispatchConfig,
    ) -> Result<Arc<RwLock<DispatchJob>>, DispatchError> {
        let dispatcher = Dispatcher::new(dataset, config)?;
        let job = Arc::new(RwLock::new(DispatchJob::new(id.clone(), dispatcher)));
        self.jobs.write().insert(id, job.clone());
        Ok(job)
    }

    /// Gets a job by ID.
    pub fn get_job(&self, id: &str) -> Option<Arc<RwLock<DispatchJob>>> {
        self.jobs.read().get(id).cloned()
    }

    /// Gets a job by ID or fails with [`DispatchError::UnknownJob`].
    pub fn job(&self, id: &str) -> Result<Arc<RwLock<DispatchJob>>, DispatchError> {
        self.get_job(id).ok_or_else(|| DispatchError::UnknownJob(id.to_string()))
    }

    /// Lists all job IDs in sorted order.
    pub fn list_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes a job by ID.
    pub fn remove_job(&self, id: &str) -> Option<Arc<RwLock<DispatchJob>>> {
        self.jobs.write().remove(id)
    }

    /// Runs the planner for job `id`, holding the job's write lock throughout.
    pub fn run_plan(&self, id: &str) -> Result<PlanSummary, DispatchError> {
        let job = self.job(id)?;
        let mut guard = job.write();
        guard.plan()
    }
}

impl Default for DispatchService {
    fn default() -> Self {
        Self::new()
    }
}
