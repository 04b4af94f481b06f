use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::app::{PriceScanError, Result};
use crate::domain::{RunState, SourceStatus};
use crate::runner::{RunResult, SourceRunner};

/// Scheduler-level knobs. Per-source intervals live on the sources
/// themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-checks (default: 60)
    pub tick_secs: u64,

    /// Maximum sources scraped concurrently (default: 4)
    pub max_workers: usize,

    /// Fully-failed runs before a source cools down (default: 5)
    pub max_consecutive_errors: u32,

    /// Cooldown length in seconds (default: 300)
    pub error_cooldown_secs: u64,

    /// Seconds to wait for in-flight runs on stop before aborting
    /// them (default: 5)
    pub grace_secs: u64,

    /// Run all enabled sources immediately on start (default: true)
    pub initial_run: bool,

    /// Jittered delay between queries within one run, milliseconds
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            max_workers: 4,
            max_consecutive_errors: 5,
            error_cooldown_secs: 300,
            grace_secs: 5,
            initial_run: true,
            delay_min_ms: 500,
            delay_max_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Owns the source runners and their scheduling state.
///
/// One coordinating loop decides which sources are due and dispatches
/// them onto a semaphore-bounded worker pool; workers never touch
/// `RunState` — results come back over a channel and are applied on
/// the loop. Constructed explicitly by the process entry point and
/// shared by reference with whatever controls it; there is no global
/// instance.
pub struct Scheduler {
    config: SchedulerConfig,
    runners: Vec<Arc<SourceRunner>>,
    states: Mutex<HashMap<String, RunState>>,
    shutdown_tx: watch::Sender<bool>,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, runners: Vec<SourceRunner>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));

        let mut states = HashMap::new();
        for runner in &runners {
            states.insert(runner.source().id.clone(), RunState::new());
        }

        Self {
            config,
            runners: runners.into_iter().map(Arc::new).collect(),
            states: Mutex::new(states),
            shutdown_tx,
            semaphore,
        }
    }

    /// Run the tick loop until `stop()` is called.
    ///
    /// Performs an immediate first pass over all enabled sources, then
    /// re-checks dueness every tick. In-flight runs get a grace period
    /// on shutdown before being aborted.
    pub async fn run(&self) {
        let enabled = self
            .runners
            .iter()
            .filter(|r| r.source().enabled)
            .count();
        info!(
            "scheduler started: {} sources ({} enabled), tick {}s, {} workers",
            self.runners.len(),
            enabled,
            self.config.tick_secs,
            self.config.max_workers
        );

        let (results_tx, mut results_rx) = mpsc::channel::<(String, RunResult)>(32);
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut shutdown = self.shutdown_tx.subscribe();

        if *shutdown.borrow() {
            info!("scheduler stopped before starting");
            return;
        }

        if self.config.initial_run {
            self.dispatch_due(&mut tasks, &mut in_flight, &results_tx);
        }

        let mut timer = interval(self.config.tick());
        timer.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.dispatch_due(&mut tasks, &mut in_flight, &results_tx);
                }
                Some((source_id, result)) = results_rx.recv() => {
                    in_flight.remove(&source_id);
                    self.apply_result(&source_id, &result);
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(
            "scheduler stopping, {} runs in flight, grace {}s",
            tasks.len(),
            self.config.grace_secs
        );

        let deadline = tokio::time::Instant::now() + self.config.grace();
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("grace period elapsed, aborting {} in-flight runs", tasks.len());
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        // Record whatever results made it back before the deadline.
        while let Ok((source_id, result)) = results_rx.try_recv() {
            self.apply_result(&source_id, &result);
        }

        info!("scheduler stopped");
    }

    /// Signal the tick loop (and any in-flight runs) to stop.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Immediate out-of-band run of one source, bypassing the due
    /// check. With no query, the source's whole configured set runs.
    pub async fn manual_trigger(&self, source_id: &str, query: Option<&str>) -> Result<RunResult> {
        let runner = self
            .runners
            .iter()
            .find(|r| r.source().id == source_id)
            .ok_or_else(|| PriceScanError::SourceNotFound(source_id.to_string()))?
            .clone();

        let queries = match query {
            Some(q) => vec![q.to_string()],
            None => runner.source().queries.clone(),
        };

        info!("manual run of '{}' ({} queries)", source_id, queries.len());
        let result = runner.run(&queries, self.shutdown_tx.subscribe()).await;
        self.apply_result(source_id, &result);
        Ok(result)
    }

    /// Read-only snapshot of every source's scheduling state, sorted
    /// by source id.
    pub fn status(&self) -> Vec<SourceStatus> {
        let states = self.states.lock().expect("state lock poisoned");

        let mut statuses: Vec<SourceStatus> = self
            .runners
            .iter()
            .map(|runner| {
                let source = runner.source();
                let state = states.get(&source.id).cloned().unwrap_or_default();
                SourceStatus {
                    id: source.id.clone(),
                    display_name: source.display_name().to_string(),
                    enabled: source.enabled,
                    interval_secs: source.interval_secs,
                    last_run_at: state.last_run_at,
                    consecutive_errors: state.consecutive_errors,
                    in_cooldown_until: state.in_cooldown_until,
                }
            })
            .collect();

        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    fn dispatch_due(
        &self,
        tasks: &mut JoinSet<()>,
        in_flight: &mut HashSet<String>,
        results_tx: &mpsc::Sender<(String, RunResult)>,
    ) {
        let now = Utc::now();

        let due: Vec<Arc<SourceRunner>> = {
            let states = self.states.lock().expect("state lock poisoned");
            self.runners
                .iter()
                .filter(|runner| {
                    let source = runner.source();
                    source.enabled
                        && !in_flight.contains(&source.id)
                        && states
                            .get(&source.id)
                            .is_some_and(|state| state.is_due(source.interval(), now))
                })
                .cloned()
                .collect()
        };

        for runner in due {
            let source_id = runner.source().id.clone();
            debug!("dispatching '{}'", source_id);
            in_flight.insert(source_id.clone());

            let semaphore = self.semaphore.clone();
            let results_tx = results_tx.clone();
            let shutdown = self.shutdown_tx.subscribe();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("Semaphore closed");
                let queries = runner.source().queries.clone();
                let result = runner.run(&queries, shutdown).await;
                let _ = results_tx.send((source_id, result)).await;
            });
        }
    }

    /// Apply a finished run to the source's state. Only ever called
    /// from the coordinating loop or a manual trigger, never from
    /// workers.
    fn apply_result(&self, source_id: &str, result: &RunResult) {
        let now = Utc::now();
        let mut states = self.states.lock().expect("state lock poisoned");
        let state = states.entry(source_id.to_string()).or_default();

        if result.all_failed() {
            let entered_cooldown = state.record_failure(
                now,
                self.config.max_consecutive_errors,
                self.config.error_cooldown(),
            );
            if entered_cooldown {
                warn!(
                    "'{}' failed {} runs in a row, cooling down until {}",
                    source_id,
                    state.consecutive_errors,
                    state
                        .in_cooldown_until
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default()
                );
            } else {
                warn!(
                    "'{}' run fully failed ({} consecutive)",
                    source_id, state.consecutive_errors
                );
            }
        } else {
            state.record_success(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::normalizer::{Normalizer, NormalizerConfig};
    use crate::runner::testing::{test_source, FakeExtractor, FakeFetcher, RecordingSink};

    fn runner_for(
        source: crate::domain::SourceConfig,
        responses: HashMap<String, Vec<u8>>,
        sink: Arc<RecordingSink>,
    ) -> (SourceRunner, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher::new(responses));
        let runner = SourceRunner::new(
            source,
            fetcher.clone(),
            Arc::new(FakeExtractor),
            Normalizer::new(NormalizerConfig::default()),
            sink,
            (0, 0),
        );
        (runner, fetcher)
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_secs: 1,
            grace_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initial_pass_runs_enabled_sources() {
        let sink = Arc::new(RecordingSink::default());

        let mut responses = HashMap::new();
        responses.insert("q=phone".to_string(), b"Phone X|120 000".to_vec());
        let (enabled_runner, _) = runner_for(test_source("carrefour"), responses, sink.clone());

        let mut disabled = test_source("auchan");
        disabled.enabled = false;
        let (disabled_runner, disabled_fetcher) =
            runner_for(disabled, HashMap::new(), sink.clone());

        let scheduler = Arc::new(Scheduler::new(
            fast_config(),
            vec![enabled_runner, disabled_runner],
        ));

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };

        // Wait for the initial pass to land in the sink.
        let mut waited = 0;
        while sink.records().is_empty() && waited < 2_000 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += 20;
        }

        scheduler.stop();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "carrefour");
        assert_eq!(disabled_fetcher.call_count(), 0);

        let status = scheduler.status();
        let carrefour = status.iter().find(|s| s.id == "carrefour").unwrap();
        assert!(carrefour.last_run_at.is_some());
        assert_eq!(carrefour.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn test_source_not_redispatched_before_interval() {
        let sink = Arc::new(RecordingSink::default());
        let mut responses = HashMap::new();
        responses.insert("q=phone".to_string(), b"Phone X|120 000".to_vec());

        // Hour-long interval: only the initial pass may run.
        let (runner, fetcher) = runner_for(test_source("carrefour"), responses, sink.clone());
        let scheduler = Arc::new(Scheduler::new(fast_config(), vec![runner]));

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };

        // Long enough for several ticks.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        scheduler.stop();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_trigger_cooldown_and_success_resets() {
        let sink = Arc::new(RecordingSink::default());
        // No responses: every fetch fails.
        let (runner, _) = runner_for(test_source("carrefour"), HashMap::new(), sink.clone());

        let config = SchedulerConfig {
            max_consecutive_errors: 5,
            error_cooldown_secs: 300,
            ..fast_config()
        };
        let scheduler = Scheduler::new(config, vec![runner]);

        for expected in 1..=5u32 {
            let result = scheduler.manual_trigger("carrefour", None).await.unwrap();
            assert!(result.all_failed());

            let status = scheduler.status();
            assert_eq!(status[0].consecutive_errors, expected);
        }

        let status = scheduler.status();
        let until = status[0].in_cooldown_until.expect("cooldown set");
        assert!(until > Utc::now());

        // A scheduled pass must now skip the source entirely: its
        // state says not due.
        let states = scheduler.states.lock().unwrap();
        let state = states.get("carrefour").unwrap();
        assert!(!state.is_due(Duration::from_secs(1), Utc::now()));
        drop(states);

        // One success clears the counter and the cooldown.
        let sink2 = Arc::new(RecordingSink::default());
        let mut responses = HashMap::new();
        responses.insert("q=phone".to_string(), b"Phone X|120 000".to_vec());
        let (runner2, _) = runner_for(test_source("carrefour"), responses, sink2);
        let scheduler2 = Scheduler::new(fast_config(), vec![runner2]);
        {
            let mut states = scheduler2.states.lock().unwrap();
            let state = states.get_mut("carrefour").unwrap();
            state.consecutive_errors = 5;
            state.in_cooldown_until = Some(Utc::now() + chrono::Duration::minutes(5));
        }
        let result = scheduler2.manual_trigger("carrefour", None).await.unwrap();
        assert!(!result.all_failed());
        assert_eq!(scheduler2.status()[0].consecutive_errors, 0);
        assert!(scheduler2.status()[0].in_cooldown_until.is_none());
    }

    #[tokio::test]
    async fn test_manual_trigger_unknown_source() {
        let scheduler = Scheduler::new(fast_config(), Vec::new());
        let err = scheduler.manual_trigger("nope", None).await.unwrap_err();
        assert!(matches!(err, PriceScanError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_manual_trigger_single_query() {
        let sink = Arc::new(RecordingSink::default());
        let mut responses = HashMap::new();
        responses.insert("q=tv".to_string(), b"TV Z|300 000".to_vec());

        let (runner, fetcher) = runner_for(test_source("carrefour"), responses, sink.clone());
        let scheduler = Scheduler::new(fast_config(), vec![runner]);

        let result = scheduler
            .manual_trigger("carrefour", Some("tv"))
            .await
            .unwrap();

        assert_eq!(result.queries_attempted, 1);
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(sink.records()[0].product_name, "TV Z");
    }

    #[tokio::test]
    async fn test_stop_returns_within_grace_period() {
        let sink = Arc::new(RecordingSink::default());
        let mut responses = HashMap::new();
        responses.insert("q=".to_string(), b"Phone X|120 000".to_vec());

        // Many queries with long delays: a full run takes far longer
        // than the grace period.
        let mut source = test_source("carrefour");
        source.queries = (0..50).map(|i| format!("query{i}")).collect();
        let fetcher = Arc::new(FakeFetcher::new(responses));
        let runner = SourceRunner::new(
            source,
            fetcher.clone(),
            Arc::new(FakeExtractor),
            Normalizer::new(NormalizerConfig::default()),
            sink,
            (500, 500),
        );

        let scheduler = Arc::new(Scheduler::new(fast_config(), vec![runner]));
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };

        // Let the initial pass get going, then stop.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stop_started = std::time::Instant::now();
        scheduler.stop();

        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("scheduler did not stop within grace period")
            .unwrap();

        // Stop must not wait out all 50 queries (~25s); the run reacts
        // to the shutdown signal during its inter-query delay.
        assert!(stop_started.elapsed() < Duration::from_secs(2));
    }
}
