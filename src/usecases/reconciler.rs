//! Reconciler (daemon) use case: keep the service's listening port equal to the
//! port gluetun forwards.
//!
//! One request in flight at a time; the only suspension points are the HTTP calls
//! and the sleep between iterations.

use crate::domain::{ErrorClass, ForwardedPort, GlueforwardError};
use crate::ports::{PortSource, ServiceClient};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Consecutive immediate retries allowed before falling back to the retry interval.
pub const MAX_IMMEDIATE_RETRIES: u32 = 3;

/// Whether an unchanged port is written to the service again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    /// Skip the write when the port equals the last successfully applied one.
    #[default]
    SkipUnchanged,
    /// Write on every iteration (survives out-of-band resets of the service).
    Always,
}

/// Sleep durations between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub success: Duration,
    pub retry: Duration,
}

/// Reconciliation loop: gluetun -> reconciler -> service client.
pub struct Reconciler {
    source: Box<dyn PortSource>,
    client: Box<dyn ServiceClient>,
    intervals: Intervals,
    policy: ApplyPolicy,
    /// Last port the service accepted.
    last_applied: Option<ForwardedPort>,
    immediate_retries: u32,
}

impl Reconciler {
    pub fn new(
        source: Box<dyn PortSource>,
        client: Box<dyn ServiceClient>,
        intervals: Intervals,
        policy: ApplyPolicy,
    ) -> Self {
        Self {
            source,
            client,
            intervals,
            policy,
            last_applied: None,
            immediate_retries: 0,
        }
    }

    pub fn last_applied(&self) -> Option<ForwardedPort> {
        self.last_applied
    }

    /// Run until a fatal or unclassified error. Never returns otherwise.
    pub async fn run(&mut self) -> GlueforwardError {
        info!(
            service = self.client.name(),
            success_secs = self.intervals.success.as_secs(),
            retry_secs = self.intervals.retry.as_secs(),
            policy = ?self.policy,
            "reconciler started"
        );
        loop {
            match self.tick().await {
                Ok(pause) if pause.is_zero() => continue,
                Ok(pause) => tokio::time::sleep(pause).await,
                Err(e) => {
                    error!(service = self.client.name(), error = %e, "stopping");
                    return e;
                }
            }
        }
    }

    /// One iteration. Returns how long to wait before the next one, or the error
    /// that must end the process.
    pub async fn tick(&mut self) -> Result<Duration, GlueforwardError> {
        let port = match self.source.get_forwarded_port().await {
            Ok(port) => port,
            Err(e) => return self.recover(e),
        };

        if self.policy == ApplyPolicy::SkipUnchanged && self.last_applied == Some(port) {
            debug!(%port, "port unchanged; nothing to do");
            self.immediate_retries = 0;
            return Ok(self.intervals.success);
        }

        match self.client.set_port(port).await {
            Ok(()) => {
                if self.last_applied != Some(port) {
                    info!(
                        service = self.client.name(),
                        %port,
                        previous = ?self.last_applied.map(ForwardedPort::get),
                        "port applied"
                    );
                }
                self.last_applied = Some(port);
                self.immediate_retries = 0;
                Ok(self.intervals.success)
            }
            Err(e) => self.recover(e),
        }
    }

    fn recover(&mut self, e: GlueforwardError) -> Result<Duration, GlueforwardError> {
        match e.class() {
            ErrorClass::Fatal | ErrorClass::Unclassified => Err(e),
            ErrorClass::RetryableImmediate if self.immediate_retries < MAX_IMMEDIATE_RETRIES => {
                self.immediate_retries += 1;
                info!(error = %e, attempt = self.immediate_retries, "retrying now");
                Ok(Duration::ZERO)
            }
            ErrorClass::RetryableImmediate | ErrorClass::RetryableDelayed => {
                self.immediate_retries = 0;
                warn!(
                    error = %e,
                    retry_secs = self.intervals.retry.as_secs(),
                    "retrying later"
                );
                Ok(self.intervals.retry)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const INTERVALS: Intervals = Intervals {
        success: Duration::from_secs(300),
        retry: Duration::from_secs(10),
    };

    type Script<T> = Arc<Mutex<VecDeque<Result<T, GlueforwardError>>>>;

    /// Port source replaying a script; an exhausted script is a fatal error.
    struct ScriptedSource {
        script: Script<ForwardedPort>,
        calls: Arc<Mutex<u32>>,
    }

    #[async_trait::async_trait]
    impl PortSource for ScriptedSource {
        async fn get_forwarded_port(&self) -> Result<ForwardedPort, GlueforwardError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(auth_failed()))
        }
    }

    /// Service client recording every port it is asked to set.
    struct RecordingClient {
        script: Script<()>,
        applied: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait::async_trait]
    impl ServiceClient for RecordingClient {
        fn name(&self) -> &str {
            "recording"
        }

        async fn set_port(&mut self, port: ForwardedPort) -> Result<(), GlueforwardError> {
            self.applied.lock().unwrap().push(port.get());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    struct Harness {
        reconciler: Reconciler,
        source_calls: Arc<Mutex<u32>>,
        applied: Arc<Mutex<Vec<u32>>>,
    }

    impl Harness {
        fn applied(&self) -> Vec<u32> {
            self.applied.lock().unwrap().clone()
        }

        fn source_calls(&self) -> u32 {
            *self.source_calls.lock().unwrap()
        }
    }

    fn harness(
        ports: Vec<Result<ForwardedPort, GlueforwardError>>,
        outcomes: Vec<Result<(), GlueforwardError>>,
        policy: ApplyPolicy,
    ) -> Harness {
        let source_calls = Arc::new(Mutex::new(0));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource {
            script: Arc::new(Mutex::new(ports.into())),
            calls: Arc::clone(&source_calls),
        };
        let client = RecordingClient {
            script: Arc::new(Mutex::new(outcomes.into())),
            applied: Arc::clone(&applied),
        };
        Harness {
            reconciler: Reconciler::new(Box::new(source), Box::new(client), INTERVALS, policy),
            source_calls,
            applied,
        }
    }

    fn port(p: u32) -> Result<ForwardedPort, GlueforwardError> {
        Ok(ForwardedPort::new(p))
    }

    fn auth_failed() -> GlueforwardError {
        GlueforwardError::AuthFailed {
            service: "gluetun".into(),
            status: 401,
            body: String::new(),
        }
    }

    fn unreachable() -> GlueforwardError {
        GlueforwardError::Unreachable {
            service: "gluetun".into(),
            target: "http://gluetun:8000".into(),
            reason: "connection refused".into(),
        }
    }

    fn reauth() -> GlueforwardError {
        GlueforwardError::ReauthNeeded {
            service: "recording".into(),
        }
    }

    #[tokio::test]
    async fn test_success_waits_success_interval() {
        let mut h = harness(vec![port(51413)], vec![], ApplyPolicy::SkipUnchanged);

        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.success);
        assert_eq!(h.reconciler.last_applied(), Some(ForwardedPort::new(51413)));
        assert_eq!(h.applied(), vec![51413]);
    }

    #[tokio::test]
    async fn test_unchanged_port_is_written_once() {
        let mut h = harness(vec![port(51413), port(51413)], vec![], ApplyPolicy::SkipUnchanged);

        h.reconciler.tick().await.unwrap();
        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.success);
        assert_eq!(h.applied(), vec![51413]);
        assert_eq!(h.source_calls(), 2);
    }

    #[tokio::test]
    async fn test_always_policy_rewrites_unchanged_port() {
        let mut h = harness(vec![port(51413), port(51413)], vec![], ApplyPolicy::Always);

        h.reconciler.tick().await.unwrap();
        h.reconciler.tick().await.unwrap();
        assert_eq!(h.applied(), vec![51413, 51413]);
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_for_same_port() {
        let failed = GlueforwardError::SetPortFailed {
            service: "recording".into(),
            status: 503,
            body: String::new(),
        };
        let mut h = harness(
            vec![port(51413), port(51413)],
            vec![Err(failed), Ok(())],
            ApplyPolicy::SkipUnchanged,
        );

        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.retry);
        assert_eq!(h.reconciler.last_applied(), None);
        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.success);
        assert_eq!(h.applied(), vec![51413, 51413]);
    }

    #[tokio::test]
    async fn test_source_error_skips_service() {
        let mut h = harness(vec![Err(unreachable())], vec![], ApplyPolicy::SkipUnchanged);

        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.retry);
        assert!(h.applied().is_empty());
    }

    #[tokio::test]
    async fn test_reauth_retries_immediately() {
        let mut h = harness(
            vec![port(51413), port(51413)],
            vec![Err(reauth()), Ok(())],
            ApplyPolicy::SkipUnchanged,
        );

        assert_eq!(h.reconciler.tick().await.unwrap(), Duration::ZERO);
        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.success);
        assert_eq!(h.applied(), vec![51413, 51413]);
    }

    #[tokio::test]
    async fn test_repeated_reauth_falls_back_to_retry_interval() {
        let n = MAX_IMMEDIATE_RETRIES as usize + 1;
        let mut h = harness(
            (0..n + 1).map(|_| port(51413)).collect(),
            (0..n).map(|_| Err(reauth())).chain([Ok(())]).collect(),
            ApplyPolicy::SkipUnchanged,
        );

        for _ in 0..MAX_IMMEDIATE_RETRIES {
            assert_eq!(h.reconciler.tick().await.unwrap(), Duration::ZERO);
        }
        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.retry);
        assert_eq!(h.reconciler.tick().await.unwrap(), INTERVALS.success);
    }

    #[tokio::test]
    async fn test_fatal_and_unclassified_are_returned() {
        let mut h = harness(vec![Err(auth_failed())], vec![], ApplyPolicy::SkipUnchanged);
        let err = h.reconciler.tick().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);

        let bad = GlueforwardError::UnexpectedStatus {
            service: "recording".into(),
            status: 400,
            body: String::new(),
        };
        let mut h = harness(vec![port(51413)], vec![Err(bad)], ApplyPolicy::SkipUnchanged);
        let err = h.reconciler.tick().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unclassified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_fatal_without_further_requests() {
        let mut h = harness(
            vec![port(51413), Err(auth_failed()), port(51820)],
            vec![],
            ApplyPolicy::SkipUnchanged,
        );

        let err = h.reconciler.run().await;

        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(h.source_calls(), 2);
        assert_eq!(h.applied(), vec![51413]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_per_outcome() {
        // success (300s) -> unreachable (10s) -> reauth (0s) -> success (300s) -> fatal
        let mut h = harness(
            vec![port(51413), Err(unreachable()), port(51820), port(51820)],
            vec![Ok(()), Err(reauth()), Ok(())],
            ApplyPolicy::SkipUnchanged,
        );

        let start = tokio::time::Instant::now();
        let err = h.reconciler.run().await;

        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(
            start.elapsed(),
            INTERVALS.success + INTERVALS.retry + INTERVALS.success
        );
        assert_eq!(h.applied(), vec![51413, 51820, 51820]);
    }
}
