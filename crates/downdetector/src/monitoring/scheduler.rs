use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::executor::{Engine, RunReport};
use crate::config::validate_interval;
use crate::error::{ConfigError, EngineError};

/// Manual run requested from the periodic cycle, answered with that run's result
type RunRequest = oneshot::Sender<Result<RunReport, String>>;

struct PeriodicTask {
    shutdown: CancellationToken,
    requests: mpsc::UnboundedSender<RunRequest>,
    handle: JoinHandle<()>,
}

/// Monitoring scheduler - drives runs periodically and on demand
///
/// Cancellation is only observed between ticks: a run that has started
/// always finishes.
pub struct Scheduler {
    engine: Arc<Engine>,
    interval_secs: Arc<AtomicU64>,
    task: Mutex<Option<PeriodicTask>>,
}

impl Scheduler {
    /// Create a stopped scheduler
    pub fn new(engine: Arc<Engine>, interval_secs: u64) -> Result<Self, ConfigError> {
        validate_interval(interval_secs)?;
        Ok(Self {
            engine,
            interval_secs: Arc::new(AtomicU64::new(interval_secs)),
            task: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Start the periodic cycle; the first run fires immediately
    ///
    /// Returns `false` if the cycle was already running.
    pub fn start(&self) -> bool {
        let mut task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let shutdown = CancellationToken::new();
        let (requests, inbox) = mpsc::unbounded_channel();
        let handle = tokio::spawn(periodic_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.interval_secs),
            inbox,
            shutdown.clone(),
        ));
        *task = Some(PeriodicTask { shutdown, requests, handle });

        info!("Scheduler started with a {}s interval", self.interval_secs.load(Ordering::SeqCst));
        true
    }

    /// Stop the periodic cycle, waiting for any in-flight run to finish
    ///
    /// This includes runs started by `trigger_now` and single-service pings.
    pub async fn stop(&self) {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(PeriodicTask { shutdown, handle, .. }) = task {
            shutdown.cancel();
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
            info!("Scheduler stopped");
        }
        self.engine.wait_idle().await;
    }

    /// Change the interval; applies from the next wait onwards
    pub fn set_interval(&self, seconds: u64) -> Result<(), ConfigError> {
        validate_interval(seconds)?;
        let previous = self.interval_secs.swap(seconds, Ordering::SeqCst);
        info!("Probe interval changed from {}s to {}s", previous, seconds);
        Ok(())
    }

    /// Run now, or wait for the run already in progress and return its report
    ///
    /// While the periodic cycle is running, the request ends its current
    /// wait: the manual run takes the place of the pending tick and the next
    /// tick is a full interval later. Either way the run executes on its own
    /// task so a caller that goes away cannot leave it half done.
    pub async fn trigger_now(&self) -> Result<RunReport, EngineError> {
        let requests = match self.task.lock() {
            Ok(task) => task.as_ref().map(|t| t.requests.clone()),
            Err(poisoned) => poisoned.into_inner().as_ref().map(|t| t.requests.clone()),
        };

        if let Some(requests) = requests {
            let (reply, answer) = oneshot::channel();
            if requests.send(reply).is_ok() {
                // A dropped reply means the cycle stopped before serving us
                if let Ok(result) = answer.await {
                    return result.map_err(EngineError::RunAborted);
                }
            }
        }

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.run().await })
            .await
            .map_err(|e| EngineError::RunAborted(e.to_string()))?
    }
}

async fn periodic_loop(
    engine: Arc<Engine>,
    interval_secs: Arc<AtomicU64>,
    mut requests: mpsc::UnboundedReceiver<RunRequest>,
    shutdown: CancellationToken,
) {
    let mut waiting: Vec<RunRequest> = Vec::new();
    loop {
        // Requests arriving mid-run share this run's report
        let run = engine.run();
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(request) = requests.recv() => waiting.push(request),
            }
        };

        if let Err(e) = &result {
            warn!("Scheduled run failed: {}", e);
        }
        let reply = result.map_err(|e| e.to_string());
        for request in waiting.drain(..) {
            let _ = request.send(reply.clone());
        }

        // Read on every tick so interval changes take effect on the next wait
        let wait = Duration::from_secs(interval_secs.load(Ordering::SeqCst));
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(request) = requests.recv() => waiting.push(request),
            _ = sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::monitoring::checker::Checker;
    use crate::monitoring::notifier::LogTransport;
    use crate::monitoring::types::{ProbeResult, RunPhase};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct AlwaysUp;

    #[async_trait]
    impl Checker for AlwaysUp {
        async fn check(&self, _target: &str) -> ProbeResult {
            ProbeResult::responded(200, 10)
        }
    }

    /// Answers 200 after a fixed delay
    struct SlowUp(Duration);

    #[async_trait]
    impl Checker for SlowUp {
        async fn check(&self, _target: &str) -> ProbeResult {
            sleep(self.0).await;
            ProbeResult::responded(200, self.0.as_millis() as u64)
        }
    }

    async fn slow_scheduler(services: usize) -> (Arc<MemoryStore>, Arc<Scheduler>) {
        let store = Arc::new(MemoryStore::new());
        for i in 0..services {
            store
                .create_service("o", None, &format!("svc-{}", i), &format!("https://svc-{}.test", i))
                .await
                .unwrap();
        }
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            Arc::new(SlowUp(Duration::from_secs(2))),
            Arc::new(LogTransport),
            &EngineConfig::default(),
        );
        (store, Arc::new(Scheduler::new(Arc::new(engine), 300).unwrap()))
    }

    async fn scheduler(interval_secs: u64) -> Scheduler {
        let store = Arc::new(MemoryStore::new());
        store.create_service("o", None, "api", "https://a.test").await.unwrap();
        let engine = Engine::new(
            store.clone(),
            store,
            Arc::new(AlwaysUp),
            Arc::new(LogTransport),
            &EngineConfig::default(),
        );
        Scheduler::new(Arc::new(engine), interval_secs).unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_interval() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(
            store.clone(),
            store,
            Arc::new(AlwaysUp),
            Arc::new(LogTransport),
            &EngineConfig::default(),
        ));
        assert!(Scheduler::new(engine.clone(), 5).is_err());
        assert!(Scheduler::new(engine, 10).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_every_tick() {
        let scheduler = scheduler(300).await;
        assert!(scheduler.start());

        sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.engine().completed_runs(), 1);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(scheduler.engine().completed_runs(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let scheduler = scheduler(300).await;
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        sleep(Duration::from_secs(1)).await;
        // A second loop would have produced a second immediate run
        assert_eq!(scheduler.engine().completed_runs(), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let scheduler = scheduler(10).await;
        scheduler.start();
        sleep(Duration::from_secs(1)).await;

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        sleep(Duration::from_secs(100)).await;
        assert_eq!(scheduler.engine().completed_runs(), 1);

        // Stopping twice is harmless and the cycle can be restarted
        scheduler.stop().await;
        assert!(scheduler.start());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_from_next_wait() {
        let scheduler = scheduler(300).await;
        scheduler.start();
        sleep(Duration::from_secs(1)).await;

        // The pending 300s wait is not shortened
        scheduler.set_interval(60).unwrap();
        sleep(Duration::from_secs(298)).await;
        assert_eq!(scheduler.engine().completed_runs(), 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.engine().completed_runs(), 2);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(scheduler.engine().completed_runs(), 3);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_set_interval_rejects_out_of_range() {
        let scheduler = scheduler(300).await;

        let err = scheduler.set_interval(5).unwrap_err();
        assert_eq!(err, ConfigError::IntervalOutOfRange { got: 5, min: 10, max: 3600 });
        assert!(scheduler.set_interval(3601).is_err());
        assert_eq!(scheduler.interval(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_replaces_pending_tick() {
        let scheduler = scheduler(300).await;
        scheduler.start();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.engine().completed_runs(), 1);

        scheduler.trigger_now().await.unwrap();
        assert_eq!(scheduler.engine().completed_runs(), 2);

        // The tick due at t=300 was consumed by the manual run
        sleep(Duration::from_millis(299_500)).await;
        assert_eq!(scheduler.engine().completed_runs(), 2);

        // A full interval after the manual run
        sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.engine().completed_runs(), 3);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_share_the_cycle_run() {
        let (store, scheduler) = slow_scheduler(2).await;
        scheduler.start();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(scheduler.engine().completed_runs(), 1);

        let (a, b) = tokio::join!(scheduler.trigger_now(), scheduler.trigger_now());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(scheduler.engine().completed_runs(), 2);
        assert_eq!(store.all_pings().await.len(), 4);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_triggered_run() {
        let (store, scheduler) = slow_scheduler(3).await;

        let trigger = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_now().await }
        });
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.engine().phase(), RunPhase::Probing);

        scheduler.stop().await;
        assert_eq!(store.all_pings().await.len(), 3);
        assert_eq!(scheduler.engine().phase(), RunPhase::Idle);

        let report = trigger.await.unwrap().unwrap();
        assert_eq!(report.outcomes.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_run_in_progress_in_cycle() {
        let (store, scheduler) = slow_scheduler(2).await;
        scheduler.start();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.engine().phase(), RunPhase::Probing);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert_eq!(store.all_pings().await.len(), 2);
    }

    #[tokio::test]
    async fn test_trigger_now_without_periodic_cycle() {
        let scheduler = scheduler(300).await;
        let report = scheduler.trigger_now().await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(!scheduler.is_running());
    }
}
