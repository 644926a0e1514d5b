//! Shared doubles for engine integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use downdetector::monitoring::{Checker, Destination, NotificationTransport, ProbeResult};
use downdetector::{
    EngineConfig, MemoryStore, MetricsStore, NotifyError, PingRecord, Service, ServiceId,
    ServiceStatus, SortOrder, StorageError,
};

/// Checker answering from a url -> result table
#[derive(Default)]
pub struct ScriptedChecker {
    answers: Mutex<HashMap<String, ProbeResult>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every probe sleeps this long before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn answer(&self, url: &str, result: ProbeResult) {
        self.answers.lock().unwrap().insert(url.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, target: &str) -> ProbeResult {
        self.calls.lock().unwrap().push(target.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_else(|| ProbeResult::responded(200, 1))
    }
}

/// Transport with a single destination that keeps every message
#[derive(Default)]
pub struct InboxTransport {
    messages: Mutex<Vec<(ServiceId, String)>>,
}

impl InboxTransport {
    pub fn messages(&self) -> Vec<(ServiceId, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for InboxTransport {
    async fn destinations(&self, service: &Service) -> Result<Vec<Destination>, NotifyError> {
        Ok(vec![Destination { id: service.id.to_string(), label: "inbox".to_string() }])
    }

    async fn deliver(&self, destination: &Destination, message: &str) -> Result<(), NotifyError> {
        let id = destination.id.parse().unwrap_or_default();
        self.messages.lock().unwrap().push((id, message.to_string()));
        Ok(())
    }
}

/// Transport whose only destination refuses everything
#[derive(Default)]
pub struct RefusingTransport;

#[async_trait]
impl NotificationTransport for RefusingTransport {
    async fn destinations(&self, _service: &Service) -> Result<Vec<Destination>, NotifyError> {
        Ok(vec![Destination { id: "1".to_string(), label: "closed".to_string() }])
    }

    async fn deliver(&self, _destination: &Destination, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("403 Forbidden".into()))
    }
}

/// Metrics store that refuses writes for chosen services or stalls status updates
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<ServiceId>>,
    status_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, failing: Mutex::new(HashSet::new()), status_delay: Mutex::new(None) }
    }

    /// Every status update sleeps this long before reaching the inner store
    pub fn delay_status_updates(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_writes_for(&self, id: ServiceId) {
        self.failing.lock().unwrap().insert(id);
    }

    fn check(&self, id: ServiceId) -> Result<(), StorageError> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(StorageError::unavailable("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for FlakyStore {
    async fn append_ping(&self, record: &PingRecord) -> Result<(), StorageError> {
        self.check(record.service_id)?;
        self.inner.append_ping(record).await
    }

    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<(), StorageError> {
        self.check(id)?;
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.update_status(id, status).await
    }

    async fn list_pings(
        &self,
        id: ServiceId,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PingRecord>, StorageError> {
        self.inner.list_pings(id, limit, order).await
    }
}

pub fn config() -> EngineConfig {
    init_logs();
    EngineConfig { max_concurrent_probes: 4, ..EngineConfig::default() }
}

/// Route engine logs through the test harness; `RUST_LOG=debug` to see them
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
