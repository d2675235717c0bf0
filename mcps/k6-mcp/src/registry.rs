//! Test registry - the in-memory table of tracked k6 tests
//!
//! All state lives behind one async mutex. The lock is held for port
//! allocation, spawning and insertion (so concurrent starts never share a
//! port) but never across control API calls, readiness polling or
//! termination waits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::control::ControlClient;
use crate::error::{ErrorKind, K6Error, K6Result};
use crate::launcher::{self, OutputTail};
use crate::ports::allocate_port;
use crate::terminate::terminate;
use crate::types::{
    ReapReport, StartedTest, StatusChange, StopReport, TestDetails, TestStatus, TestView,
};

/// One tracked test
struct TestRecord {
    /// `None` once the process has been reaped or a stop has taken it
    process: Option<Child>,
    pid: u32,
    port: u16,
    script: String,
    status: TestStatus,
    started_at: DateTime<Utc>,
    exit_code: Option<i32>,
    /// Set until the control API has come up; `start_test` owns the child
    starting: bool,
    stopping: bool,
    output: OutputTail,
    readers: Vec<JoinHandle<()>>,
}

impl TestRecord {
    fn view(&self) -> TestView {
        TestView {
            pid: self.pid,
            script: self.script.clone(),
            port: self.port,
            status: self.status,
            started_at: self.started_at,
            exit_code: self.exit_code,
        }
    }

    fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Poll the process without blocking, moving to `Finished` if it exited
    fn refresh(&mut self, test_id: &str) {
        if self.starting || self.stopping || !self.is_live() {
            return;
        }
        let Some(child) = self.process.as_mut() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                info!(test_id, pid = self.pid, ?status, "test process exited");
                self.status = TestStatus::Finished;
                self.exit_code = status.code();
                self.process = None;
            }
            Ok(None) => {}
            Err(e) => warn!(test_id, pid = self.pid, "failed to poll test process: {}", e),
        }
    }

    fn ensure_live(&self, test_id: &str, action: &str) -> K6Result<()> {
        if self.starting {
            return Err(self.invalid_state(
                test_id,
                format!("cannot {}, the test is still starting", action),
            ));
        }
        if self.stopping {
            return Err(self.invalid_state(test_id, format!("cannot {}, a stop is in progress", action)));
        }
        if !self.is_live() {
            return Err(self.invalid_state(
                test_id,
                format!("cannot {} a test that is already {}", action, self.status),
            ));
        }
        Ok(())
    }

    fn invalid_state(&self, test_id: &str, reason: String) -> K6Error {
        K6Error::InvalidState {
            test_id: test_id.to_string(),
            status: self.status.to_string(),
            reason,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    tests: HashMap<String, TestRecord>,
    /// Every id ever handed out, so reaped ids are never reused
    issued_ids: HashSet<String>,
}

impl RegistryInner {
    fn held_ports(&self) -> HashSet<u16> {
        self.tests
            .values()
            .filter(|r| r.is_live())
            .map(|r| r.port)
            .collect()
    }

    fn issue_id(&mut self) -> String {
        loop {
            let hex = Uuid::new_v4().simple().to_string();
            let id = format!("test_{}", &hex[..8]);
            if self.issued_ids.insert(id.clone()) {
                return id;
            }
        }
    }

    fn record_mut(&mut self, test_id: &str) -> K6Result<&mut TestRecord> {
        self.tests
            .get_mut(test_id)
            .ok_or_else(|| K6Error::TestNotFound(test_id.to_string()))
    }
}

/// Shared handle to the registry; clones refer to the same table
#[derive(Clone)]
pub struct TestRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    config: Arc<Config>,
    control: ControlClient,
}

impl TestRegistry {
    pub fn new(config: Config) -> K6Result<Self> {
        config.validate()?;
        let control = ControlClient::new(&config.control)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            config: Arc::new(config),
            control,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Launch
    // ========================================================================

    /// Start `script_path` paused on a fresh control port
    pub async fn start_test(&self, script_path: &str) -> K6Result<StartedTest> {
        let script = Path::new(script_path);
        if !script.is_file() {
            return Err(K6Error::ScriptNotFound(script_path.to_string()));
        }

        let (test_id, pid, port) = {
            let mut inner = self.inner.lock().await;
            let port = allocate_port(
                &inner.held_ports(),
                self.config.ports.base,
                self.config.ports.search_limit,
            )?;
            let test_id = inner.issue_id();
            let launch = launcher::spawn(&self.config.engine, &test_id, script, port)?;
            let pid = launch.pid;

            inner.tests.insert(
                test_id.clone(),
                TestRecord {
                    process: Some(launch.child),
                    pid,
                    port,
                    script: script_path.to_string(),
                    status: TestStatus::Paused,
                    started_at: Utc::now(),
                    exit_code: None,
                    starting: true,
                    stopping: false,
                    output: launch.output,
                    readers: launch.readers,
                },
            );
            (test_id, pid, port)
        };

        info!(test_id = %test_id, pid, port, script = script_path, "started k6 test (paused)");

        if let Err(err) = self.await_ready(&test_id, port).await {
            warn!(test_id = %test_id, "startup failed: {}", err);
            self.discard(&test_id).await;
            return Err(err);
        }

        if let Some(record) = self.inner.lock().await.tests.get_mut(&test_id) {
            record.starting = false;
        }

        Ok(StartedTest {
            message: format!(
                "Successfully started K6 test with ID: {}. The test is currently PAUSED. \
                 Use 'resume_test' to begin.",
                test_id
            ),
            test_id,
            pid,
            port,
            script: script_path.to_string(),
            status: TestStatus::Paused,
        })
    }

    async fn await_ready(&self, test_id: &str, port: u16) -> K6Result<()> {
        let startup = &self.config.startup;
        if !startup.probe {
            tokio::time::sleep(startup.settle()).await;
            return Ok(());
        }

        let started = Instant::now();
        loop {
            self.check_still_starting(test_id).await?;

            if launcher::control_port_open(port).await {
                debug!(test_id, port, elapsed_ms = started.elapsed().as_millis() as u64, "control API ready");
                return Ok(());
            }

            if started.elapsed() >= startup.timeout() {
                return Err(K6Error::StartupTimeout {
                    port,
                    waited_ms: startup.timeout_ms,
                });
            }

            tokio::time::sleep(startup.poll_interval()).await;
        }
    }

    /// Fail if the process died before its API came up
    async fn check_still_starting(&self, test_id: &str) -> K6Result<()> {
        let (status, readers, output) = {
            let mut inner = self.inner.lock().await;
            let record = inner.tests.get_mut(test_id).ok_or_else(|| {
                K6Error::LaunchFailed("test was removed during startup".to_string())
            })?;
            let Some(child) = record.process.as_mut() else {
                return Err(K6Error::LaunchFailed(
                    "test process was released during startup".to_string(),
                ));
            };
            match child.try_wait()? {
                None => return Ok(()),
                Some(status) => (
                    status,
                    std::mem::take(&mut record.readers),
                    record.output.clone(),
                ),
            }
        };

        let lines = launcher::collect_output(readers, &output).await;
        Err(K6Error::LaunchFailed(launcher::exit_report(status, &lines)))
    }

    /// Drop a record whose startup failed, killing its process
    async fn discard(&self, test_id: &str) {
        let record = self.inner.lock().await.tests.remove(test_id);
        if let Some(mut child) = record.and_then(|r| r.process) {
            if let Err(e) = child.kill().await {
                debug!(test_id, "kill after failed startup: {}", e);
            }
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Refresh liveness for every test and return a snapshot
    pub async fn list_tests(&self) -> BTreeMap<String, TestView> {
        let mut inner = self.inner.lock().await;
        inner
            .tests
            .iter_mut()
            .map(|(id, record)| {
                record.refresh(id);
                (id.clone(), record.view())
            })
            .collect()
    }

    /// Refresh one test and, while it is live, ask the engine for its view
    pub async fn get_test(&self, test_id: &str) -> K6Result<TestDetails> {
        let (view, live) = {
            let mut inner = self.inner.lock().await;
            let record = inner.record_mut(test_id)?;
            record.refresh(test_id);
            (
                record.view(),
                record.is_live() && !record.starting && !record.stopping,
            )
        };

        let (engine, engine_error) = if live {
            match self.control.status(test_id, view.port).await {
                Ok(status) => (Some(status), None),
                Err(e) => (None, Some(e.to_string())),
            }
        } else {
            (None, None)
        };

        Ok(TestDetails {
            test_id: test_id.to_string(),
            view,
            engine,
            engine_error,
        })
    }

    // ========================================================================
    // Pause / Resume
    // ========================================================================

    pub async fn pause_test(&self, test_id: &str) -> K6Result<StatusChange> {
        self.set_paused(test_id, true).await
    }

    pub async fn resume_test(&self, test_id: &str) -> K6Result<StatusChange> {
        self.set_paused(test_id, false).await
    }

    async fn set_paused(&self, test_id: &str, paused: bool) -> K6Result<StatusChange> {
        let (action, new_status) = if paused {
            ("pause", TestStatus::Paused)
        } else {
            ("resume", TestStatus::Running)
        };

        let port = {
            let mut inner = self.inner.lock().await;
            let record = inner.record_mut(test_id)?;
            record.refresh(test_id);
            record.ensure_live(test_id, action)?;
            record.port
        };

        self.control.set_paused(test_id, port, paused).await?;

        let mut inner = self.inner.lock().await;
        let record = inner.record_mut(test_id)?;
        record.refresh(test_id);
        record.ensure_live(test_id, action)?;
        record.status = new_status;

        info!(test_id, port, status = %new_status, "{} signal accepted", action);

        Ok(StatusChange {
            test_id: test_id.to_string(),
            status: new_status,
            message: format!(
                "Successfully sent {} signal to test '{}'. New status: {}.",
                action, test_id, new_status
            ),
        })
    }

    // ========================================================================
    // Stop / Reap
    // ========================================================================

    /// SIGTERM the test, escalating to a kill after the grace period
    pub async fn stop_test(&self, test_id: &str) -> K6Result<StopReport> {
        let (mut child, pid) = {
            let mut inner = self.inner.lock().await;
            let record = inner.record_mut(test_id)?;
            record.refresh(test_id);
            record.ensure_live(test_id, "stop")?;
            let child = record.process.take().ok_or_else(|| {
                record.invalid_state(test_id, "no process handle to stop".to_string())
            })?;
            record.stopping = true;
            (child, record.pid)
        };

        info!(test_id, pid, "stopping test");
        let result = terminate(&mut child, pid, self.config.shutdown.grace()).await;

        let mut inner = self.inner.lock().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                // Hand the process back so the test stays manageable
                if let Some(record) = inner.tests.get_mut(test_id) {
                    record.stopping = false;
                    record.process = Some(child);
                }
                return Err(err);
            }
        };

        if let Some(record) = inner.tests.get_mut(test_id) {
            record.stopping = false;
            record.status = TestStatus::Stopped;
            record.exit_code = outcome.exit_code;
        }

        let message = if outcome.escalated {
            format!(
                "Test '{}' did not respond to termination, forcing it to stop.",
                test_id
            )
        } else {
            format!("Successfully stopped test '{}'.", test_id)
        };

        Ok(StopReport {
            test_id: test_id.to_string(),
            status: TestStatus::Stopped,
            escalated: outcome.escalated,
            kind: outcome.escalated.then_some(ErrorKind::TerminationTimeout),
            exit_code: outcome.exit_code,
            message,
        })
    }

    /// Remove every finished or stopped test
    pub async fn reap_tests(&self) -> ReapReport {
        let mut inner = self.inner.lock().await;
        for (id, record) in inner.tests.iter_mut() {
            record.refresh(id);
        }

        let mut removed: Vec<String> = inner
            .tests
            .iter()
            .filter(|(_, r)| !r.is_live() && !r.stopping)
            .map(|(id, _)| id.clone())
            .collect();
        removed.sort();

        for id in &removed {
            inner.tests.remove(id);
        }

        info!(count = removed.len(), "reaped terminal tests");

        ReapReport {
            message: format!("Removed {} finished or stopped test(s).", removed.len()),
            removed,
        }
    }
}
