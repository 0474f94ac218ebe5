//! Population context for the assessed profile: feature percentiles and the
//! nearest "digital twin" records.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::types::DigitalTwin;
use crate::api::RiskApi;
use crate::error::RiskDashError;
use crate::guard::Outcome;
use crate::profile::PatientProfile;

const PERCENTILE_SUFFIX: &str = "_percentile";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSnapshot {
    percentiles: BTreeMap<String, f64>,
    twins: Vec<DigitalTwin>,
}

impl CohortSnapshot {
    /// Strip the `_percentile` suffix from wire keys and drop values that are
    /// not a percentile.
    pub fn from_responses(raw_percentiles: HashMap<String, f64>, twins: Vec<DigitalTwin>) -> Self {
        let mut percentiles = BTreeMap::new();
        for (key, value) in raw_percentiles {
            let feature = key.strip_suffix(PERCENTILE_SUFFIX).unwrap_or(&key);
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                warn!("Dropping invalid percentile {} for {}", value, feature);
                continue;
            }
            percentiles.insert(feature.to_string(), value);
        }
        Self { percentiles, twins }
    }

    pub fn percentile(&self, feature: &str) -> Option<f64> {
        self.percentiles.get(feature).copied()
    }

    pub fn percentiles(&self) -> &BTreeMap<String, f64> {
        &self.percentiles
    }

    /// Twins in retrieval order.
    pub fn twins(&self) -> &[DigitalTwin] {
        &self.twins
    }

    /// Share of twins with a diabetes diagnosis; None without twins.
    pub fn twin_diabetes_rate(&self) -> Option<f64> {
        if self.twins.is_empty() {
            return None;
        }
        let diabetic = self.twins.iter().filter(|t| t.diabetes == 1).count();
        Some(diabetic as f64 / self.twins.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CohortStatus {
    Idle,
    Loading,
    Ready,
    Unavailable,
}

struct CohortState {
    requested: Option<Arc<PatientProfile>>,
    status: CohortStatus,
    snapshot: Option<CohortSnapshot>,
    error: Option<RiskDashError>,
    disposed: bool,
}

impl CohortState {
    fn reset(&mut self) {
        self.requested = None;
        self.status = CohortStatus::Idle;
        self.snapshot = None;
        self.error = None;
    }

    fn is_requested(&self, profile: &Arc<PatientProfile>) -> bool {
        self.requested
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, profile))
    }
}

/// Fetches percentiles and twins together; the snapshot is shown only when
/// both succeed. Results for anything but the most recently requested
/// profile are dropped.
#[derive(Clone)]
pub struct CohortAggregator {
    api: Arc<dyn RiskApi>,
    state: Arc<Mutex<CohortState>>,
}

impl CohortAggregator {
    pub fn new(api: Arc<dyn RiskApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(CohortState {
                requested: None,
                status: CohortStatus::Idle,
                snapshot: None,
                error: None,
                disposed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CohortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn fetch_cohort(
        &self,
        profile: Arc<PatientProfile>,
    ) -> Result<Outcome<CohortSnapshot>, RiskDashError> {
        {
            let mut state = self.lock();
            if state.disposed {
                return Ok(Outcome::Discarded);
            }
            state.requested = Some(Arc::clone(&profile));
            state.status = CohortStatus::Loading;
            state.snapshot = None;
            state.error = None;
        }

        info!("Fetching cohort context");
        let fetched = tokio::try_join!(
            self.api.cohort_analysis(&profile),
            self.api.cohort_twins(&profile)
        );

        let mut state = self.lock();
        if state.disposed || !state.is_requested(&profile) {
            debug!("Discarding cohort response for a superseded profile");
            return Ok(Outcome::Discarded);
        }

        match fetched {
            Ok((analysis, twins)) => {
                let snapshot = CohortSnapshot::from_responses(analysis.percentiles, twins.twins);
                info!(
                    "Cohort context ready: {} percentiles, {} twins",
                    snapshot.percentiles.len(),
                    snapshot.twins.len()
                );
                state.snapshot = Some(snapshot.clone());
                state.status = CohortStatus::Ready;
                Ok(Outcome::Applied(snapshot))
            }
            Err(e) => {
                warn!("Cohort context unavailable: {}", e);
                let err = RiskDashError::CohortUnavailable(e);
                state.snapshot = None;
                state.status = CohortStatus::Unavailable;
                state.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Fetch in the background. Failures are already recorded in the state.
    pub fn refresh(&self, profile: Arc<PatientProfile>) -> JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            let _ = aggregator.fetch_cohort(profile).await;
        })
    }

    /// Forget the current snapshot; in-flight fetches will be discarded.
    pub fn clear(&self) {
        self.lock().reset();
    }

    pub fn dispose(&self) {
        let mut state = self.lock();
        state.reset();
        state.disposed = true;
    }

    pub fn status(&self) -> CohortStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> Option<CohortSnapshot> {
        self.lock().snapshot.clone()
    }

    pub fn error(&self) -> Option<RiskDashError> {
        self.lock().error.clone()
    }
}
