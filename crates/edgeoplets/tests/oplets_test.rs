// crates/edgeoplets/tests/oplets_test.rs

use edgecore::{Action, JobState, JsonObject, RuntimeError, StageError, TimeUnit, Tuple};
use edgeoplets::{JsonParseOplet, TopologyExt};
use edgeruntime::{DirectProvider, Job, PeriodicScheduler, Submitter, TopologyProvider, PERIODIC_CONTROL_TYPE};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn named(job_name: &str) -> JsonObject {
    let mut config = JsonObject::new();
    config.insert("jobName".to_string(), json!(job_name));
    config
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold");
}

async fn wait_closed(job: &Job) {
    tokio::time::timeout(Duration::from_secs(5), job.closed())
        .await
        .expect("job should close");
}

fn periodic_aliases(provider: &DirectProvider) -> Vec<String> {
    let prefix = format!("{}:", PERIODIC_CONTROL_TYPE);
    provider
        .controls()
        .control_ids()
        .into_iter()
        .filter_map(|id| id.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_periodic_source_polls_and_is_controllable() {
    let provider = DirectProvider::new();
    let collected = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicU64::new(0));

    let mut topology = provider.new_topology("poller");
    let ticks = {
        let counter = counter.clone();
        topology.poll(10, TimeUnit::Milliseconds, move || {
            Ok(Some(json!(counter.fetch_add(1, Ordering::SeqCst))))
        })
    };
    let sink = collected.clone();
    topology.sink(ticks, move |tuple| sink.lock().unwrap().push(tuple));

    let job = provider.submit(topology, named("poller")).await.unwrap();
    wait_until(|| collected.lock().unwrap().len() >= 3).await;

    let aliases = periodic_aliases(&provider);
    assert_eq!(aliases.len(), 1);
    let alias = &aliases[0];
    assert!(alias.starts_with(job.id()));

    let result = provider
        .dispatcher()
        .handle(&json!({"type": "periodic", "alias": alias, "op": "setPeriod", "args": [1, "HOURS"]}))
        .await
        .unwrap();
    assert_eq!(result, json!(true));

    let scheduler = provider
        .controls()
        .get_control(PERIODIC_CONTROL_TYPE, alias, &PeriodicScheduler::control_interface())
        .unwrap();
    assert_eq!(scheduler.period(), 1);
    assert_eq!(scheduler.unit(), TimeUnit::Hours);

    // Ticks are in order and each value arrives once.
    let values: Vec<u64> = collected
        .lock()
        .unwrap()
        .iter()
        .filter_map(Tuple::as_u64)
        .collect();
    assert!(values.windows(2).all(|pair| pair[1] == pair[0] + 1), "values: {:?}", values);

    job.state_change(Action::Close).await.unwrap();
    assert_eq!(job.current_state(), JobState::Closed);
    assert!(periodic_aliases(&provider).is_empty());
}

#[tokio::test]
async fn test_periodic_source_skips_empty_fetches() {
    let provider = DirectProvider::new();
    let collected = Arc::new(Mutex::new(Vec::new()));
    let polls = Arc::new(AtomicU64::new(0));

    let mut topology = provider.new_topology("sparse");
    let ticks = {
        let polls = polls.clone();
        topology.poll(5, TimeUnit::Milliseconds, move || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            Ok((n % 2 == 0).then(|| json!(n)))
        })
    };
    let sink = collected.clone();
    topology.sink(ticks, move |tuple| sink.lock().unwrap().push(tuple));

    let job = provider.submit(topology, JsonObject::new()).await.unwrap();
    wait_until(|| polls.load(Ordering::SeqCst) >= 6).await;
    job.state_change(Action::Close).await.unwrap();

    let values = collected.lock().unwrap().clone();
    assert!(!values.is_empty());
    assert!(values.iter().all(|v| v.as_u64().map_or(false, |n| n % 2 == 0)));
}

#[tokio::test]
async fn test_failing_fetch_fails_the_job() {
    let provider = DirectProvider::new();

    let mut topology = provider.new_topology("faulty");
    let ticks = topology.poll(5, TimeUnit::Milliseconds, || {
        Err(StageError::Failed("sensor offline".to_string()))
    });
    topology.debug(ticks);

    let job = provider.submit(topology, JsonObject::new()).await.unwrap();
    wait_closed(&job).await;
    assert!(periodic_aliases(&provider).is_empty());
}

#[tokio::test]
async fn test_zero_period_rejected_at_submission() {
    let provider = DirectProvider::new();

    let mut topology = provider.new_topology("stalled");
    let ticks = topology.poll(0, TimeUnit::Seconds, || Ok(None));
    topology.debug(ticks);

    let result = provider.submit(topology, JsonObject::new()).await;
    assert!(matches!(result, Err(RuntimeError::ExecutionFailure(_))));
    assert!(provider.job_registry().snapshots().is_empty());
}

#[tokio::test]
async fn test_json_parse_and_map() {
    let provider = DirectProvider::new();
    let collected = Arc::new(Mutex::new(Vec::new()));

    let mut topology = provider.new_topology("parse");
    let raw = topology.strings([r#"{"temp": 20}"#, r#"{"temp": 25}"#]);
    let parsed = topology.add_stage(raw, JsonParseOplet);
    let temps = topology.map(parsed, |reading| reading.get("temp").cloned());
    let sink = collected.clone();
    topology.sink(temps, move |tuple| sink.lock().unwrap().push(tuple));

    let job = provider.submit(topology, JsonObject::new()).await.unwrap();
    wait_closed(&job).await;

    assert_eq!(*collected.lock().unwrap(), vec![json!(20), json!(25)]);
}

#[tokio::test]
async fn test_map_can_drop_tuples() {
    let provider = DirectProvider::new();
    let collected = Arc::new(Mutex::new(Vec::new()));

    let mut topology = provider.new_topology("filter");
    let numbers = topology.values((1..=6).map(|n| json!(n)));
    let even = topology.map(numbers, |n| n.as_i64().filter(|n| n % 2 == 0).map(|n| json!(n)));
    let sink = collected.clone();
    topology.sink(even, move |tuple| sink.lock().unwrap().push(tuple));

    let job = provider.submit(topology, JsonObject::new()).await.unwrap();
    wait_closed(&job).await;

    assert_eq!(*collected.lock().unwrap(), vec![json!(2), json!(4), json!(6)]);
}

#[tokio::test]
async fn test_invalid_json_fails_the_job() {
    let provider = DirectProvider::new();

    let mut topology = provider.new_topology("garbage");
    let raw = topology.strings(["{broken"]);
    let parsed = topology.add_stage(raw, JsonParseOplet);
    topology.debug(parsed);

    let job = provider.submit(topology, JsonObject::new()).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), job.complete())
        .await
        .expect("job should finish");
    if let Err(e) = result {
        assert!(e.to_string().contains("JSON parse error"), "{}", e);
    }
    wait_closed(&job).await;
}
