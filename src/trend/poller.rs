use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::RiskApi;
use crate::error::RiskDashError;

use super::TrendSeries;

/// Shortest polling period; `tokio::time::interval` rejects a zero period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct PollerState {
    series: Option<TrendSeries>,
    last_error: Option<RiskDashError>,
    active: bool,
    /// Bumped on every activate/deactivate; polls from an older epoch are dropped.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

/// Periodically refreshes the risk history while active.
pub struct TrendPoller {
    api: Arc<dyn RiskApi>,
    interval: Duration,
    limit: usize,
    state: Arc<Mutex<PollerState>>,
}

impl TrendPoller {
    pub fn new(api: Arc<dyn RiskApi>, interval: Duration, limit: usize) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {:?} too short, using {:?}",
                interval, MIN_POLL_INTERVAL
            );
        }
        Self {
            api,
            interval: interval.max(MIN_POLL_INTERVAL),
            limit,
            state: Arc::new(Mutex::new(PollerState {
                series: None,
                last_error: None,
                active: false,
                epoch: 0,
                timer: None,
            })),
        }
    }

    fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll now and then on every interval until deactivated.
    pub fn activate(&self) {
        let mut state = Self::lock(&self.state);
        if state.active {
            return;
        }
        state.active = true;
        state.epoch += 1;

        let api = Arc::clone(&self.api);
        let shared = Arc::downgrade(&self.state);
        let (period, limit) = (self.interval, self.limit);
        info!("Trend polling every {:?}", period);
        state.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let _ = Self::fetch(&api, &shared, limit).await;
            }
        }));
    }

    /// Stop polling. A poll already in flight will not update the series.
    pub fn deactivate(&self) {
        let mut state = Self::lock(&self.state);
        if !state.active {
            return;
        }
        state.active = false;
        state.epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        debug!("Trend polling stopped");
    }

    /// Fetch the history once. `Ok(None)` means there is no history yet.
    /// A failure is recorded and leaves the current series in place.
    pub async fn poll(&self, limit: usize) -> Result<Option<TrendSeries>, RiskDashError> {
        Self::fetch(&self.api, &self.state, limit).await
    }

    async fn fetch(
        api: &Arc<dyn RiskApi>,
        shared: &Mutex<PollerState>,
        limit: usize,
    ) -> Result<Option<TrendSeries>, RiskDashError> {
        let epoch = Self::lock(shared).epoch;

        let fetched = api.history(limit).await;

        let mut state = Self::lock(shared);
        if state.epoch != epoch {
            debug!("Discarding history response from a stopped poller");
            return match fetched {
                Ok(payload) => Ok(TrendSeries::from_payload(payload, limit)),
                Err(e) => Err(RiskDashError::Transport(e)),
            };
        }

        match fetched {
            Ok(payload) => {
                let series = TrendSeries::from_payload(payload, limit);
                debug!(
                    "History refreshed: {} records",
                    series.as_ref().map_or(0, |s| s.records().len())
                );
                state.series = series.clone();
                state.last_error = None;
                Ok(series)
            }
            Err(e) => {
                warn!("Failed to fetch history: {}", e);
                let err = RiskDashError::Transport(e);
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn series(&self) -> Option<TrendSeries> {
        Self::lock(&self.state).series.clone()
    }

    pub fn last_error(&self) -> Option<RiskDashError> {
        Self::lock(&self.state).last_error.clone()
    }

    pub fn is_active(&self) -> bool {
        Self::lock(&self.state).active
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for TrendPoller {
    fn drop(&mut self) {
        self.deactivate();
    }
}
