//! Matching engine: on-demand nearby-task discovery and the periodic
//! urgent-task sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MatchingConfig;
use crate::geo::{self, Point};
use crate::models::notification::{Notification, NotificationKind};
use crate::models::task::{Task, TaskCategory, Urgency};
use crate::notify::Notifier;
use crate::persistence::db::Database;
use crate::persistence::task_repo::TaskRepo;
use crate::persistence::user_repo::UserRepo;
use crate::Result;

/// Optional filters for discovery queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoverFilters {
    /// Only tasks in this category.
    pub category: Option<TaskCategory>,
    /// Only tasks at this urgency tier.
    pub urgency: Option<Urgency>,
}

/// An open task annotated with its distance from the query origin.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredTask {
    /// The open task.
    #[serde(flatten)]
    pub task: Task,
    /// Great-circle distance from the query origin, kilometres.
    pub distance_km: f64,
}

/// What one urgent sweep looked at and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Open urgent/sos tasks considered.
    pub tasks: usize,
    /// Helpers with a fresh location considered.
    pub helpers: usize,
    /// Notifications emitted.
    pub notified: usize,
}

/// Finds candidate helpers near tasks and serves discovery queries.
///
/// The sweep is a pairwise scan over open urgent tasks and active
/// helpers. Fine at current scale; a grid or geohash index keyed by
/// helper location is the upgrade path if helper counts grow.
#[derive(Clone)]
pub struct MatchingEngine {
    tasks: TaskRepo,
    users: UserRepo,
    notifier: Notifier,
    config: MatchingConfig,
}

impl MatchingEngine {
    /// Create the engine over shared state.
    #[must_use]
    pub fn new(db: Arc<Database>, notifier: Notifier, config: MatchingConfig) -> Self {
        Self {
            tasks: TaskRepo::new(Arc::clone(&db)),
            users: UserRepo::new(db),
            notifier,
            config,
        }
    }

    /// Open tasks within `radius_km` of `origin`, nearest first.
    ///
    /// Tasks owned by `exclude_user_id` are never returned; every
    /// result carries its computed distance.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn discover(
        &self,
        origin: Point,
        radius_km: f64,
        filters: DiscoverFilters,
        exclude_user_id: &str,
    ) -> Result<Vec<DiscoveredTask>> {
        let open = self.tasks.list_open_excluding(exclude_user_id).await?;

        let mut results: Vec<DiscoveredTask> = open
            .into_iter()
            .filter(|task| {
                filters.category.is_none_or(|c| task.category == c)
                    && filters.urgency.is_none_or(|u| task.urgency == u)
            })
            .filter_map(|task| {
                let distance_km = geo::haversine_km(origin, task.location());
                (distance_km <= radius_km).then_some(DiscoveredTask { task, distance_km })
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }

    /// Notification radius for an urgency tier, kilometres.
    fn radius_for(&self, urgency: Urgency) -> Option<f64> {
        match urgency {
            Urgency::Urgent => Some(self.config.urgent_radius_km),
            Urgency::Sos => Some(self.config.sos_radius_km),
            Urgency::Normal => None,
        }
    }

    /// One matching sweep: pair open urgent/sos tasks with active
    /// helpers and notify every pair within threshold.
    ///
    /// The seen-set guarantees at most one notification per
    /// (task, helper) pair within a single sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a query fails; notification failures
    /// for individual pairs are logged and skipped.
    pub async fn run_urgent_sweep(&self) -> Result<SweepSummary> {
        let tasks = self.tasks.list_open_urgent().await?;
        if tasks.is_empty() {
            return Ok(SweepSummary::default());
        }

        let freshness_cutoff =
            Utc::now() - chrono::Duration::minutes(self.config.helper_freshness_minutes);
        let helpers = self.users.list_active_helpers(freshness_cutoff).await?;

        let mut summary = SweepSummary {
            tasks: tasks.len(),
            helpers: helpers.len(),
            notified: 0,
        };
        if helpers.is_empty() {
            return Ok(summary);
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for task in &tasks {
            let Some(radius_km) = self.radius_for(task.urgency) else {
                continue;
            };
            for helper in &helpers {
                if helper.id == task.requester_id {
                    continue;
                }
                let Some(helper_location) = helper.location() else {
                    continue;
                };
                let distance = geo::haversine_km(task.location(), helper_location);
                if distance > radius_km {
                    continue;
                }
                if !seen.insert((task.id.clone(), helper.id.clone())) {
                    continue;
                }

                let notification = Notification::new(
                    helper.id.clone(),
                    NotificationKind::UrgentNearby,
                    "Urgent Help Needed Nearby".to_owned(),
                    format!(
                        "\"{}\" needs help {:.1} km from you",
                        task.title, distance
                    ),
                )
                .with_task(task.id.clone());

                match self.notifier.send(notification).await {
                    Ok(_) => summary.notified += 1,
                    Err(err) => {
                        error!(task_id = %task.id, helper_id = %helper.id, %err,
                            "sweep notification failed");
                    }
                }
            }
        }

        info!(
            tasks = summary.tasks,
            helpers = summary.helpers,
            notified = summary.notified,
            "urgent sweep completed"
        );
        Ok(summary)
    }
}

/// Spawn the periodic matching sweep.
///
/// The interval is the external trigger; each tick runs one sweep.
#[must_use]
pub fn spawn_matching_task(
    engine: MatchingEngine,
    interval_seconds: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("matching task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = engine.run_urgent_sweep().await {
                        error!(?err, "urgent sweep failed");
                    }
                }
            }
        }
    })
}
