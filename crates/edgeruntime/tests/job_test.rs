// crates/edgeruntime/tests/job_test.rs

use async_trait::async_trait;
use edgecore::{Action, JobSnapshot, JobState, Result, RuntimeError};
use edgeruntime::control::{ControlDispatcher, ControlRegistry};
use edgeruntime::{next_job_id, Executable, Job, JobRegistry, RuntimeServices, ID_PREFIX};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};

/// Counts every action and completes once closed.
struct CountingExecutable {
    initialized: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    done: watch::Sender<bool>,
}

#[derive(Clone, Default)]
struct Counts {
    initialized: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl CountingExecutable {
    fn new(counts: &Counts) -> Self {
        Self {
            initialized: counts.initialized.clone(),
            started: counts.started.clone(),
            closed: counts.closed.clone(),
            done: watch::channel(false).0,
        }
    }
}

#[async_trait]
impl Executable for CountingExecutable {
    async fn initialize(&self) -> Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.done.send_replace(true);
        Ok(())
    }

    async fn complete(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut done = self.done.subscribe();
        let wait = done.wait_for(|done| *done);
        match timeout {
            Some(bound) => Ok(tokio::time::timeout(bound, wait).await.is_ok()),
            None => {
                let _ = wait.await;
                Ok(true)
            }
        }
    }
}

/// Never completes on its own.
struct StuckExecutable;

#[async_trait]
impl Executable for StuckExecutable {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, timeout: Option<Duration>) -> Result<bool> {
        match timeout {
            Some(bound) => {
                tokio::time::sleep(bound).await;
                Ok(false)
            }
            None => std::future::pending().await,
        }
    }
}

/// Fails to start.
struct BrokenExecutable;

#[async_trait]
impl Executable for BrokenExecutable {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Err(RuntimeError::InvalidArgument("no stages".to_string()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, _timeout: Option<Duration>) -> Result<bool> {
        Ok(true)
    }
}

/// Blocks initialization until released.
struct GatedExecutable {
    gate: Arc<Notify>,
}

#[async_trait]
impl Executable for GatedExecutable {
    async fn initialize(&self) -> Result<()> {
        self.gate.notified().await;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, _timeout: Option<Duration>) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingRegistry {
    snapshots: Mutex<Vec<JobSnapshot>>,
    removed: Mutex<Vec<String>>,
}

impl JobRegistry for RecordingRegistry {
    fn add_job(&self, snapshot: JobSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    fn update_job(&self, snapshot: JobSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    fn remove_job(&self, job_id: &str) -> bool {
        self.removed.lock().unwrap().push(job_id.to_string());
        true
    }
}

/// Logs registry calls in order; slow to accept the `CLOSED` snapshot.
#[derive(Default)]
struct OrderedRegistry {
    log: Mutex<Vec<String>>,
}

impl JobRegistry for OrderedRegistry {
    fn add_job(&self, snapshot: JobSnapshot) {
        self.log.lock().unwrap().push(format!("add {}", snapshot.current_state));
    }

    fn update_job(&self, snapshot: JobSnapshot) {
        if snapshot.current_state == JobState::Closed {
            std::thread::sleep(Duration::from_millis(50));
        }
        self.log.lock().unwrap().push(format!("update {}", snapshot.current_state));
    }

    fn remove_job(&self, _job_id: &str) -> bool {
        self.log.lock().unwrap().push("remove".to_string());
        true
    }
}

fn create_job(executable: impl Executable + 'static) -> Arc<Job> {
    Job::new(next_job_id(), "test", None, Box::new(executable), &RuntimeServices::default()).unwrap()
}

#[tokio::test]
async fn test_job_lifecycle() {
    let counts = Counts::default();
    let job = create_job(CountingExecutable::new(&counts));

    assert_eq!(job.current_state(), JobState::Constructed);
    assert_eq!(job.next_state(), None);

    job.state_change(Action::Initialize).await.unwrap();
    assert_eq!(job.current_state(), JobState::Initialized);

    job.state_change(Action::Start).await.unwrap();
    assert_eq!(job.current_state(), JobState::Running);

    job.state_change(Action::Close).await.unwrap();
    assert_eq!(job.current_state(), JobState::Closed);
    assert_eq!(job.next_state(), None);

    assert_eq!(counts.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(counts.started.load(Ordering::SeqCst), 1);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let counts = Counts::default();
    let job = create_job(CountingExecutable::new(&counts));

    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();
    job.state_change(Action::Close).await.unwrap();
    job.state_change(Action::Close).await.unwrap();

    assert_eq!(job.current_state(), JobState::Closed);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_before_start() {
    let counts = Counts::default();
    let job = create_job(CountingExecutable::new(&counts));

    job.state_change(Action::Close).await.unwrap();
    assert_eq!(job.current_state(), JobState::Closed);
    assert_eq!(counts.initialized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_illegal_transitions_rejected() {
    let counts = Counts::default();
    let job = create_job(CountingExecutable::new(&counts));

    let result = job.state_change(Action::Start).await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Start))));
    assert_eq!(job.current_state(), JobState::Constructed);

    job.state_change(Action::Initialize).await.unwrap();
    let result = job.state_change(Action::Initialize).await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Initialize))));

    job.state_change(Action::Close).await.unwrap();
    let result = job.state_change(Action::Start).await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Start))));

    assert_eq!(counts.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(counts.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pause_and_resume_unsupported() {
    let job = create_job(CountingExecutable::new(&Counts::default()));
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();

    let result = job.state_change(Action::Pause).await;
    assert!(matches!(result, Err(RuntimeError::UnsupportedOperation(_))));
    let result = job.state_change(Action::Resume).await;
    assert!(matches!(result, Err(RuntimeError::UnsupportedOperation(_))));

    let result = job.state_change(Action::Initialize).await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Initialize))));

    assert_eq!(job.current_state(), JobState::Running);
    assert_eq!(job.next_state(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transition_in_flight_rejects_others() {
    let gate = Arc::new(Notify::new());
    let job = create_job(GatedExecutable { gate: gate.clone() });

    let initializing = {
        let job = job.clone();
        tokio::spawn(async move { job.state_change(Action::Initialize).await })
    };

    while job.next_state().is_none() {
        tokio::task::yield_now().await;
    }
    assert_eq!(job.next_state(), Some(JobState::Initialized));

    let result = job.state_change(Action::Close).await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Close))));

    gate.notify_one();
    initializing.await.unwrap().unwrap();
    assert_eq!(job.current_state(), JobState::Initialized);
    assert_eq!(job.next_state(), None);
}

#[tokio::test]
async fn test_failed_action_keeps_state() {
    let job = create_job(BrokenExecutable);
    job.state_change(Action::Initialize).await.unwrap();

    let result = job.state_change(Action::Start).await;
    match result {
        Err(RuntimeError::ExecutionFailure(cause)) => {
            let original = cause.downcast_ref::<RuntimeError>();
            assert!(matches!(original, Some(RuntimeError::InvalidArgument(_))));
        }
        other => panic!("expected an execution failure, got {:?}", other),
    }

    assert_eq!(job.current_state(), JobState::Initialized);
    assert_eq!(job.next_state(), None);

    // The job can still be closed.
    job.state_change(Action::Close).await.unwrap();
    assert_eq!(job.current_state(), JobState::Closed);
}

#[tokio::test]
async fn test_complete_timeout_elapses() {
    let job = create_job(StuckExecutable);
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();

    let started = Instant::now();
    let result = job.complete_timeout(Duration::from_secs(1)).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(RuntimeError::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(950), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
    assert_eq!(job.current_state(), JobState::Running);
}

#[tokio::test]
async fn test_complete_returns_once_closed() {
    let job = create_job(StuckExecutable);
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();
    job.state_change(Action::Close).await.unwrap();

    job.complete().await.unwrap();
    job.complete_timeout(Duration::from_millis(10)).await.unwrap();
    job.closed().await;
}

#[tokio::test]
async fn test_complete_waits_for_executable() {
    let job = create_job(CountingExecutable::new(&Counts::default()));
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();

    let waiting = {
        let job = job.clone();
        tokio::spawn(async move { job.complete().await })
    };

    job.state_change(Action::Close).await.unwrap();
    waiting.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_job_registry_sees_every_transition() {
    let registry = Arc::new(RecordingRegistry::default());
    let services = RuntimeServices {
        jobs: Some(registry.clone() as Arc<dyn JobRegistry>),
        ..Default::default()
    };
    let job = Job::new(
        next_job_id(),
        "wordcount",
        None,
        Box::new(CountingExecutable::new(&Counts::default())),
        &services,
    )
    .unwrap();

    job.state_change(Action::Initialize).await.unwrap();
    job.set_name("renamed");

    let snapshots = registry.snapshots.lock().unwrap().clone();
    let states: Vec<(JobState, Option<JobState>)> = snapshots
        .iter()
        .map(|s| (s.current_state, s.next_state))
        .collect();
    assert_eq!(
        states,
        vec![
            (JobState::Constructed, None),
            (JobState::Constructed, Some(JobState::Initialized)),
            (JobState::Initialized, None),
            (JobState::Initialized, None),
        ]
    );

    assert_eq!(snapshots[0].name, format!("wordcount_{}", job.id()));
    assert_eq!(snapshots.last().unwrap().name, "renamed");
    assert_eq!(job.name(), "renamed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closed_watchers_see_final_snapshot_registered() {
    let registry = Arc::new(OrderedRegistry::default());
    let services = RuntimeServices {
        jobs: Some(registry.clone() as Arc<dyn JobRegistry>),
        ..Default::default()
    };
    let job = Job::new(
        next_job_id(),
        "ordered",
        None,
        Box::new(CountingExecutable::new(&Counts::default())),
        &services,
    )
    .unwrap();
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();

    let watcher = tokio::spawn({
        let job = job.clone();
        let registry = registry.clone();
        async move {
            job.closed().await;
            registry.remove_job(job.id());
        }
    });

    job.state_change(Action::Close).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watcher should finish")
        .unwrap();

    let log = registry.log.lock().unwrap().clone();
    assert_eq!(log.last().map(String::as_str), Some("remove"), "log: {:?}", log);
    assert!(log.contains(&"update CLOSED".to_string()));
}

#[tokio::test]
async fn test_job_closed_through_control() {
    let controls = Arc::new(ControlRegistry::new());
    let services = RuntimeServices {
        controls: Some(controls.clone()),
        ..Default::default()
    };
    let counts = Counts::default();
    let job = Job::new(
        next_job_id(),
        "test",
        Some("nightly".to_string()),
        Box::new(CountingExecutable::new(&counts)),
        &services,
    )
    .unwrap();

    assert_eq!(job.control_id(), Some("job:nightly"));
    job.state_change(Action::Initialize).await.unwrap();
    job.state_change(Action::Start).await.unwrap();

    let dispatcher = ControlDispatcher::new(controls);
    let result = dispatcher
        .handle(&json!({"type": "job", "alias": "nightly", "op": "stateChange", "args": ["CLOSE"]}))
        .await
        .unwrap();

    assert_eq!(result, Value::Bool(true));
    assert_eq!(job.current_state(), JobState::Closed);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);

    // An illegal request reaches the caller as an error.
    let result = dispatcher
        .handle(&json!({"type": "job", "alias": "nightly", "op": "stateChange", "args": ["START"]}))
        .await;
    assert!(matches!(result, Err(RuntimeError::IllegalTransition(Action::Start))));
}

#[test]
fn test_job_ids_are_unique() {
    let first = next_job_id();
    let second = next_job_id();

    assert!(first.starts_with(ID_PREFIX));
    assert!(second.starts_with(ID_PREFIX));
    assert_ne!(first, second);
}
