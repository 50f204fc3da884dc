use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry, Histogram, IntCounter, Registry,
};
use tokio::sync::watch;

use super::{ScrapeConfig, ScrapePipeline};
use crate::cluster::ClusterClient;
use crate::committed_offsets::AlternateLagSource;
use crate::metrics::ScrapeResult;

const MET_RUN_TIME_NAME: &str = "scrape_coordinator_run_time_seconds";
const MET_RUN_TIME_HELP: &str = "Time (s) taken by one complete scrape of the cluster";
const MET_RUNS_NAME: &str = "scrape_coordinator_runs_total";
const MET_RUNS_HELP: &str = "Scrapes of the cluster actually executed";
const MET_COALESCED_NAME: &str = "scrape_coordinator_coalesced_total";
const MET_COALESCED_HELP: &str = "Scrape requests served by a scrape already in flight";

/// Result cell of a run, written once at the end of it.
type SharedResult = Option<Arc<ScrapeResult>>;

/// The run currently in flight, that new callers attach to.
struct InFlight {
    generation: u64,
    result: watch::Receiver<SharedResult>,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: Option<InFlight>,
    generation: u64,
}

impl CoordinatorState {
    /// Clears the in-flight run, only if it's still the run of the given `generation`.
    fn clear(&mut self, generation: u64) {
        if self.in_flight.as_ref().is_some_and(|f| f.generation == generation) {
            self.in_flight = None;
        }
    }
}

/// Entry point of every scrape: concurrent callers share the result of a single [`ScrapePipeline`] run.
///
/// A caller arriving while a run is in flight waits for that run's result. A caller arriving after
/// the result was handed off starts a new run. Each run executes in its own task: a caller giving up
/// on waiting does not cancel the run.
pub struct ScrapeCoordinator {
    pipeline: Arc<ScrapePipeline>,
    allow_concurrent: bool,
    state: Arc<Mutex<CoordinatorState>>,

    // Prometheus Metrics
    metric_run_time: Histogram,
    metric_runs: IntCounter,
    metric_coalesced: IntCounter,
}

impl ScrapeCoordinator {
    /// Create a new [`ScrapeCoordinator`]
    ///
    /// # Arguments
    ///
    /// * `client` - Used by every phase of the scrape to read from the cluster
    /// * `config` - Configuration of every scrape
    /// * `alternate_lag_source` - If set, used to emit an additional Consumer Group lag metric
    /// * `metrics` - Registry to register the internal metrics with
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: ScrapeConfig,
        alternate_lag_source: Option<Arc<dyn AlternateLagSource>>,
        metrics: Arc<Registry>,
    ) -> Self {
        Self {
            pipeline: Arc::new(ScrapePipeline::new(client, &config, alternate_lag_source, metrics.clone())),
            allow_concurrent: config.allow_concurrent,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            metric_run_time: register_histogram_with_registry!(MET_RUN_TIME_NAME, MET_RUN_TIME_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RUN_TIME_NAME}': {e}")),
            metric_runs: register_int_counter_with_registry!(MET_RUNS_NAME, MET_RUNS_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RUNS_NAME}': {e}")),
            metric_coalesced: register_int_counter_with_registry!(MET_COALESCED_NAME, MET_COALESCED_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_COALESCED_NAME}': {e}")),
        }
    }

    /// Scrapes the cluster, or waits for the scrape already in flight.
    pub async fn scrape(&self) -> Arc<ScrapeResult> {
        if self.allow_concurrent {
            self.metric_runs.inc();
            let timer = self.metric_run_time.start_timer();
            let result = self.pipeline.run().await;
            timer.observe_duration();
            return Arc::new(result);
        }

        let mut result_rx = {
            let mut state = lock(&self.state);
            match &state.in_flight {
                Some(in_flight) => {
                    info!("Scrape already in flight: waiting for its result");
                    self.metric_coalesced.inc();
                    in_flight.result.clone()
                },
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let (result_sx, result_rx) = watch::channel::<SharedResult>(None);
                    state.in_flight = Some(InFlight {
                        generation,
                        result: result_rx.clone(),
                    });
                    self.spawn_run(generation, result_sx);
                    result_rx
                },
            }
        };

        let result = match result_rx.wait_for(Option::is_some).await {
            Ok(result) => result.clone().unwrap_or_default(),
            Err(e) => {
                error!("Scrape run ended without a result: {e}");
                Arc::default()
            },
        };
        result
    }

    fn spawn_run(&self, generation: u64, result_sx: watch::Sender<SharedResult>) {
        let pipeline = self.pipeline.clone();
        let metric_run_time = self.metric_run_time.clone();
        let metric_runs = self.metric_runs.clone();

        // Frees the coordinator for new runs, even if this one panics
        let guard = InFlightGuard {
            state: self.state.clone(),
            generation,
            result_sx,
        };

        tokio::spawn(async move {
            debug!("Scrape run {generation} started");
            metric_runs.inc();
            let timer = metric_run_time.start_timer();
            let result = Arc::new(pipeline.run().await);
            timer.observe_duration();

            guard.hand_off(result);
            debug!("Scrape run {generation} done");
        });
    }
}

/// Owns the result cell of a run: dropping it without a hand-off leaves the waiters without result.
struct InFlightGuard {
    state: Arc<Mutex<CoordinatorState>>,
    generation: u64,
    result_sx: watch::Sender<SharedResult>,
}

impl InFlightGuard {
    /// Once cleared, no caller can attach to this run anymore.
    fn hand_off(self, result: Arc<ScrapeResult>) {
        let mut state = lock(&self.state);
        state.clear(self.generation);
        self.result_sx.send_replace(Some(result));
    }
}

impl Drop for InFlightGuard {
    /// Clears the in-flight run before `result_sx` is dropped and waiters are woken up.
    fn drop(&mut self) {
        lock(&self.state).clear(self.generation);
    }
}

fn lock(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
