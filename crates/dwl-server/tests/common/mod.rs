//! Common test utilities for DWL server integration tests
//!
//! In-memory stand-ins for every pipeline collaborator, so the orchestrator
//! and the HTTP surface can be exercised without PostgreSQL.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestPipeline;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let pipeline = TestPipeline::builder().rows(42).build();
//!     let report = pipeline.orchestrator.run(Default::default()).await;
//! }
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::TempDir;

use dwl_server::{
    audit::{single_line, AuditError, LineLog},
    notify::{MemoryNotificationChannel, NotificationChannel, NotifyError, Subscription},
    pipeline::{OrchestratorSettings, PipelineComponents, UploadOrchestrator},
    staging::StagingStore,
    transform::{InvocationError, InvocationRequest, LoadVerifier, TransformJob, VerificationError},
};

pub const TOPIC: &str = "log_channel";
pub const RELATION: &str = "sales_data_cube";

/// Line log that keeps appended lines in memory
#[derive(Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl RecordingLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl LineLog for RecordingLog {
    async fn append(&self, line: &str) -> Result<(), AuditError> {
        self.lines.lock().unwrap().push(single_line(line));
        Ok(())
    }
}

/// Channel that counts subscriptions and can refuse them
pub struct CountingChannel {
    inner: MemoryNotificationChannel,
    subscriptions: AtomicUsize,
    refuse: bool,
}

impl CountingChannel {
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for CountingChannel {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, NotifyError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(NotifyError::Subscribe {
                topic: topic.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.inner.subscribe(topic).await
    }
}

/// Transform job that publishes scripted notices, then returns a scripted outcome
pub struct ScriptedJob {
    channel: MemoryNotificationChannel,
    notices: Vec<String>,
    outcome: Result<(), InvocationError>,
    delay: Duration,
    calls: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedJob {
    pub fn calls(&self) -> Vec<InvocationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransformJob for ScriptedJob {
    async fn invoke(&self, request: &InvocationRequest) -> Result<(), InvocationError> {
        self.calls.lock().unwrap().push(request.clone());
        request.joined_paths()?;
        for notice in &self.notices {
            self.channel.publish(TOPIC, notice.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Verifier with a fixed answer
pub struct FixedVerifier {
    result: Result<i64, VerificationError>,
    calls: AtomicUsize,
}

impl FixedVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoadVerifier for FixedVerifier {
    fn relation(&self) -> &str {
        RELATION
    }

    async fn count_rows(&self) -> Result<i64, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Fully wired orchestrator over in-memory fakes and a temporary staging dir
pub struct TestPipeline {
    pub staging_dir: TempDir,
    pub orchestrator: Arc<UploadOrchestrator>,
    pub channel: Arc<CountingChannel>,
    pub job: Arc<ScriptedJob>,
    pub verifier: Arc<FixedVerifier>,
    pub audit: Arc<RecordingLog>,
    pub faults: Arc<RecordingLog>,
}

impl TestPipeline {
    pub fn builder() -> TestPipelineBuilder {
        TestPipelineBuilder::default()
    }
}

pub struct TestPipelineBuilder {
    notices: Vec<String>,
    outcome: Result<(), InvocationError>,
    rows: Result<i64, VerificationError>,
    refuse_subscribe: bool,
    job_delay: Duration,
    invocation_timeout: Duration,
    staging_subdir: String,
}

impl Default for TestPipelineBuilder {
    fn default() -> Self {
        Self {
            notices: Vec::new(),
            outcome: Ok(()),
            rows: Ok(1),
            refuse_subscribe: false,
            job_delay: Duration::ZERO,
            invocation_timeout: Duration::from_secs(5),
            staging_subdir: "uploads".to_string(),
        }
    }
}

impl TestPipelineBuilder {
    pub fn notices(mut self, notices: &[&str]) -> Self {
        self.notices = notices.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn job_fails(mut self, err: InvocationError) -> Self {
        self.outcome = Err(err);
        self
    }

    pub fn rows(mut self, rows: i64) -> Self {
        self.rows = Ok(rows);
        self
    }

    pub fn verification_fails(mut self, message: &str) -> Self {
        self.rows = Err(VerificationError::QueryFailed {
            message: message.to_string(),
        });
        self
    }

    pub fn refuse_subscribe(mut self) -> Self {
        self.refuse_subscribe = true;
        self
    }

    pub fn slow_job(mut self, delay: Duration, timeout: Duration) -> Self {
        self.job_delay = delay;
        self.invocation_timeout = timeout;
        self
    }

    /// Staging root relative to the pipeline's temp directory
    pub fn staging_subdir(mut self, subdir: &str) -> Self {
        self.staging_subdir = subdir.to_string();
        self
    }

    pub fn build(self) -> TestPipeline {
        let staging_dir = TempDir::new().unwrap();
        let hub = MemoryNotificationChannel::new();

        let channel = Arc::new(CountingChannel {
            inner: hub.clone(),
            subscriptions: AtomicUsize::new(0),
            refuse: self.refuse_subscribe,
        });
        let job = Arc::new(ScriptedJob {
            channel: hub,
            notices: self.notices,
            outcome: self.outcome,
            delay: self.job_delay,
            calls: Mutex::new(Vec::new()),
        });
        let verifier = Arc::new(FixedVerifier {
            result: self.rows,
            calls: AtomicUsize::new(0),
        });
        let audit = Arc::new(RecordingLog::default());
        let faults = Arc::new(RecordingLog::default());

        let components = PipelineComponents {
            staging: StagingStore::new(staging_dir.path().join(&self.staging_subdir)),
            channel: channel.clone(),
            job: job.clone(),
            verifier: verifier.clone(),
            audit: audit.clone(),
            faults: faults.clone(),
        };
        let settings = OrchestratorSettings {
            topic: TOPIC.to_string(),
            poll_timeout: Duration::from_millis(50),
            max_drain: Duration::from_secs(2),
            invocation_timeout: self.invocation_timeout,
        };

        TestPipeline {
            staging_dir,
            orchestrator: Arc::new(UploadOrchestrator::new(components, settings)),
            channel,
            job,
            verifier,
            audit,
            faults,
        }
    }
}
