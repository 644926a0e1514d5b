use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info};

use super::checker::Checker;
use super::notifier::{NotificationTransport, Notifier, TransitionEvent, log_notify_failure};
use super::recorder::MetricsRecorder;
use super::transition::is_transition;
use super::types::{ProbeResult, RunPhase};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::storage::models::{Service, ServiceId, ServiceStatus};
use crate::storage::{MetricsStore, ServiceRegistry};

/// What happened to one service during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceOutcome {
    pub service_id: ServiceId,
    pub service_name: String,
    pub previous: ServiceStatus,
    pub probe: ProbeResult,
    pub observed_at: DateTime<Utc>,
    /// Status differs from the one the registry held before the probe
    pub transitioned: bool,
    /// Ping record and status update both persisted
    pub recorded: bool,
    /// A destination accepted the transition message
    pub notified: bool,
}

/// Summary of one complete run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcomes in probe-completion order
    pub outcomes: Vec<ServiceOutcome>,
}

impl RunReport {
    pub fn transitions(&self) -> usize {
        self.outcomes.iter().filter(|o| o.transitioned).count()
    }

    pub fn storage_failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.recorded).count()
    }
}

/// Resets the observable phase to idle however the run ends
struct PhaseGuard<'a>(&'a watch::Sender<RunPhase>);

impl<'a> PhaseGuard<'a> {
    fn enter(sender: &'a watch::Sender<RunPhase>, phase: RunPhase) -> Self {
        sender.send_replace(phase);
        Self(sender)
    }

    fn advance(&self, phase: RunPhase) {
        self.0.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(RunPhase::Idle);
    }
}

/// Wall clock that never steps backwards within one process
///
/// Ping timestamps must not decrease per service even if the system clock
/// is adjusted, so each reading is clamped to the last one handed out.
#[derive(Debug)]
pub(crate) struct MonotonicClock {
    last: StdMutex<DateTime<Utc>>,
}

impl MonotonicClock {
    pub(crate) fn new() -> Self {
        Self { last: StdMutex::new(DateTime::<Utc>::MIN_UTC) }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clamp(Utc::now())
    }

    fn clamp(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if wall > *last {
            *last = wall;
        }
        *last
    }
}

/// Runs fetch, probe, record and notify across all services
///
/// At most one run (or single-service ping) executes at a time. Per-service
/// failures are logged and never abort the run.
pub struct Engine {
    registry: Arc<dyn ServiceRegistry>,
    checker: Arc<dyn Checker>,
    recorder: MetricsRecorder,
    notifier: Notifier,
    max_concurrent_probes: usize,
    /// Run lock, guarding the report of the last completed run
    last_run: Mutex<Option<RunReport>>,
    /// Number of completed runs, bumped while `last_run` is held
    completed_runs: AtomicU64,
    phase: watch::Sender<RunPhase>,
    clock: MonotonicClock,
}

impl Engine {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        store: Arc<dyn MetricsStore>,
        checker: Arc<dyn Checker>,
        transport: Arc<dyn NotificationTransport>,
        config: &EngineConfig,
    ) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            registry,
            checker,
            recorder: MetricsRecorder::new(store),
            notifier: Notifier::new(transport),
            max_concurrent_probes: config.max_concurrent_probes.max(1),
            last_run: Mutex::new(None),
            completed_runs: AtomicU64::new(0),
            phase,
            clock: MonotonicClock::new(),
        }
    }

    /// Current stage of the run in progress, `Idle` if none
    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Number of full runs completed since start
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::SeqCst)
    }

    /// Execute a full run, or join the one already in progress
    ///
    /// A caller that had to wait for the lock while another run completed
    /// gets that run's report instead of probing everything a second time.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let seen = self.completed_runs.load(Ordering::SeqCst);
        let mut last_run = self.last_run.lock().await;

        if self.completed_runs.load(Ordering::SeqCst) != seen {
            if let Some(report) = last_run.as_ref() {
                debug!("Joined run finished at {}", report.finished_at);
                return Ok(report.clone());
            }
        }

        let report = self.execute_run().await?;
        *last_run = Some(report.clone());
        self.completed_runs.fetch_add(1, Ordering::SeqCst);
        Ok(report)
    }

    /// Wait until no run or single-service ping holds the run lock
    pub async fn wait_idle(&self) {
        drop(self.last_run.lock().await);
    }

    /// Probe one service on behalf of its owner
    ///
    /// Once authorized, the probe runs on its own task so a caller that goes
    /// away cannot leave a ping recorded without its status update.
    pub async fn ping_service(self: &Arc<Self>, caller: &str, id: ServiceId) -> Result<ServiceOutcome, EngineError> {
        self.authorize(caller, id).await?;
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.ping_authorized(id).await })
            .await
            .map_err(|e| EngineError::RunAborted(e.to_string()))?
    }

    async fn ping_authorized(&self, id: ServiceId) -> Result<ServiceOutcome, EngineError> {
        let _lock = self.last_run.lock().await;
        let phase = PhaseGuard::enter(&self.phase, RunPhase::Fetching);

        // Status may have moved while waiting for the lock
        let service = match self.registry.get_service(id).await? {
            Some(fresh) => fresh,
            None => return Err(EngineError::NotFound(id)),
        };

        let mut outcomes = self.pipeline(&phase, vec![service]).await;
        outcomes.pop().ok_or(EngineError::NotFound(id))
    }

    async fn authorize(&self, caller: &str, id: ServiceId) -> Result<Service, EngineError> {
        let service = self.registry.get_service(id).await?.ok_or(EngineError::NotFound(id))?;
        if service.owner_id != caller {
            return Err(EngineError::Unauthorized { caller: caller.to_string(), service_id: id });
        }
        Ok(service)
    }

    async fn execute_run(&self) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let phase = PhaseGuard::enter(&self.phase, RunPhase::Fetching);

        let services = match self.registry.list_services().await {
            Ok(services) => dedup_by_id(services),
            Err(e) => {
                error!("Failed to fetch services, skipping run: {}", e);
                return Err(e.into());
            }
        };
        debug!("Fetched {} services", services.len());

        let outcomes = self.pipeline(&phase, services).await;
        let report = RunReport { started_at, finished_at: Utc::now(), outcomes };

        info!(
            "Run finished: {} services, {} transitions, {} storage failures in {:?}",
            report.outcomes.len(),
            report.transitions(),
            report.storage_failures(),
            timer.elapsed()
        );
        Ok(report)
    }

    /// Probe, record and notify a set of distinct services
    async fn pipeline(&self, phase: &PhaseGuard<'_>, services: Vec<Service>) -> Vec<ServiceOutcome> {
        phase.advance(RunPhase::Probing);
        let probed = self.probe_all(services).await;

        phase.advance(RunPhase::Recording);
        let mut outcomes = Vec::with_capacity(probed.len());
        let mut pending = Vec::new();
        for (service, probe, observed_at) in probed {
            let transitioned = is_transition(service.status, probe.status);
            let recorded = match self
                .recorder
                .record(&service, probe.status, probe.latency_ms, observed_at)
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    error!("Failed to record ping for service {}: {}", service.name, e);
                    false
                }
            };

            // Unrecorded transitions are detected again on the next run
            if transitioned && recorded {
                pending.push((outcomes.len(), TransitionEvent {
                    service: service.clone(),
                    previous: service.status,
                    current: probe.status,
                    latency_ms: probe.latency_ms,
                    observed_at,
                }));
            }

            outcomes.push(ServiceOutcome {
                service_id: service.id,
                service_name: service.name,
                previous: service.status,
                probe,
                observed_at,
                transitioned,
                recorded,
                notified: false,
            });
        }

        phase.advance(RunPhase::Notifying);
        for (index, event) in pending {
            match self.notifier.notify(&event).await {
                Ok(_) => outcomes[index].notified = true,
                Err(e) => log_notify_failure(&event.service, &e),
            }
        }

        outcomes
    }

    /// Probe concurrently, yielding results in completion order
    async fn probe_all(&self, services: Vec<Service>) -> Vec<(Service, ProbeResult, DateTime<Utc>)> {
        let checker = &self.checker;
        let clock = &self.clock;
        futures::stream::iter(services)
            .map(|service| async move {
                let result = checker.check(&service.url).await;
                debug!(
                    "Probed {} ({}): {} in {} ms",
                    service.name, service.url, result.status, result.latency_ms
                );
                (service, result, clock.now())
            })
            .buffer_unordered(self.max_concurrent_probes)
            .collect()
            .await
    }
}

/// Keep the first occurrence of each id so no service is probed twice
fn dedup_by_id(services: Vec<Service>) -> Vec<Service> {
    let mut seen = HashSet::new();
    services.into_iter().filter(|s| seen.insert(s.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::notifier::LogTransport;
    use crate::storage::MemoryStore;
    use crate::error::StorageError;
    use async_trait::async_trait;

    /// Checker that answers 200 for every target
    struct AlwaysUp;

    #[async_trait]
    impl Checker for AlwaysUp {
        async fn check(&self, _target: &str) -> ProbeResult {
            ProbeResult::responded(200, 10)
        }
    }

    /// Registry that fails every call
    struct BrokenRegistry;

    #[async_trait]
    impl ServiceRegistry for BrokenRegistry {
        async fn list_services(&self) -> Result<Vec<Service>, StorageError> {
            Err(StorageError::unavailable("connection refused"))
        }

        async fn get_service(&self, _id: ServiceId) -> Result<Option<Service>, StorageError> {
            Err(StorageError::unavailable("connection refused"))
        }
    }

    fn engine(store: Arc<MemoryStore>) -> Engine {
        Engine::new(
            store.clone(),
            store,
            Arc::new(AlwaysUp),
            Arc::new(LogTransport),
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_dedup_keeps_first() {
        let service = |id, name: &str| Service {
            id,
            owner_id: "o".to_string(),
            guild_id: None,
            name: name.to_string(),
            url: "https://example.com".to_string(),
            status: ServiceStatus::Unknown,
            created_at: Utc::now(),
        };
        let deduped = dedup_by_id(vec![service(1, "a"), service(2, "b"), service(1, "c")]);
        assert_eq!(deduped.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle() {
        let store = Arc::new(MemoryStore::new());
        store.create_service("o", None, "api", "https://a.test").await.unwrap();
        let engine = engine(store);

        let phases = engine.subscribe_phase();
        assert_eq!(engine.phase(), RunPhase::Idle);

        engine.run().await.unwrap();
        assert_eq!(engine.phase(), RunPhase::Idle);
        assert!(phases.has_changed().unwrap());
        assert_eq!(engine.completed_runs(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_run_and_resets_phase() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(
            Arc::new(BrokenRegistry),
            store,
            Arc::new(AlwaysUp),
            Arc::new(LogTransport),
            &EngineConfig::default(),
        );

        let result = engine.run().await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert_eq!(engine.phase(), RunPhase::Idle);
        assert_eq!(engine.completed_runs(), 0);
    }

    #[test]
    fn test_clock_never_steps_backwards() {
        let clock = MonotonicClock::new();
        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(clock.clamp(later), later);

        // A wall clock set back an hour still yields the latest reading
        assert_eq!(clock.clamp(Utc::now()), later);
        assert_eq!(clock.now(), later);
        assert!(clock.clamp(later + chrono::Duration::seconds(1)) > later);
    }

    #[tokio::test]
    async fn test_empty_registry_produces_empty_report() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let report = engine.run().await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.finished_at >= report.started_at);
    }
}
