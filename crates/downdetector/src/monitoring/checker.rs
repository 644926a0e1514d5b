use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::types::{ProbeFailure, ProbeResult};

/// Reachability check against a single target
///
/// Implementations must not fail: every problem is folded into a `down`
/// result so one bad endpoint cannot abort a run.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, target: &str) -> ProbeResult;
}

/// HTTP GET checker
pub struct HttpChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("downdetector/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }

    fn sentinel_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> ProbeResult {
        let start = Instant::now();

        // Resolves once the status line and headers are in, the body is never read
        match timeout(self.timeout, self.client.get(target).send()).await {
            Ok(Ok(response)) => {
                let latency = start.elapsed().as_millis() as u64;
                ProbeResult::responded(response.status().as_u16(), latency)
            }
            Ok(Err(e)) => {
                tracing::debug!("Probe of {} failed: {}", target, e);
                let failure = if e.is_timeout() {
                    ProbeFailure::Timeout
                } else {
                    ProbeFailure::Network(e.to_string())
                };
                ProbeResult::failed(failure, self.sentinel_ms())
            }
            Err(_) => {
                tracing::debug!("Probe of {} timed out after {:?}", target, self.timeout);
                ProbeResult::failed(ProbeFailure::Timeout, self.sentinel_ms())
            }
        }
    }
}
