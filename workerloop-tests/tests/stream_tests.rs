// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use futures::stream;
use serde_json::{json, Value};
use workerloop::{Args, ObjectRef, Outcome, Scheduler, Task, TaskError};
use workerloop_tests::fixtures::{count, Counter};
use workerloop_tests::init_logging;
use workerloop_tests::recorder::Recorder;

fn streaming() -> Scheduler {
    Scheduler::builder()
        .name("streams")
        .streaming(true)
        .queue_timeout(Duration::from_millis(20))
        .build()
}

#[test]
fn test_streams_interleave_round_robin() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    scheduler.handlers().add(recorder.handler());

    // both tasks are queued before the loop starts, so the order is fixed
    scheduler.add_event(Task::call(count).arg(4).key("a")).unwrap();
    scheduler.add_event(Task::call(count).arg(4).key("b")).unwrap();
    scheduler.start().unwrap();
    scheduler.close();

    let order: Vec<String> = recorder
        .results()
        .into_iter()
        .filter_map(|result| result.key)
        .collect();
    assert_eq!(order, vec!["a", "a", "b", "a", "b", "a", "b", "b"]);
    assert_eq!(recorder.values_for("a"), vec![json!(0), json!(1), json!(2), json!(3)]);
    assert_eq!(recorder.values_for("b"), vec![json!(0), json!(1), json!(2), json!(3)]);
}

#[test]
fn test_stream_items_carry_their_index() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    scheduler
        .run_until_complete([Task::call(count).arg(3)], vec![recorder.handler()])
        .unwrap();

    let indices: Vec<_> = recorder
        .results()
        .iter()
        .map(|result| result.stream_index)
        .collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
}

#[test]
fn test_async_stream_and_plain_task_mix() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    let words = |_: &Args| -> anyhow::Result<Outcome> {
        let items: Vec<Value> = ["x", "y"].iter().map(|word| json!(word)).collect();
        Ok(Outcome::stream(stream::iter(items)))
    };

    scheduler
        .run_until_complete(
            [
                Task::call(words).key("words"),
                Task::call(workerloop_tests::fixtures::plus_one).arg(1).key("plain"),
            ],
            vec![recorder.handler()],
        )
        .unwrap();

    assert_eq!(recorder.values_for("words"), vec![json!("x"), json!("y")]);
    assert_eq!(recorder.values_for("plain"), vec![json!(2)]);
}

#[test]
fn test_cached_method_can_stream() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    let counter = ObjectRef::new(Counter { count: 2 });

    scheduler
        .run_until_complete(
            [Task::method(&counter, "count_to").arg(5).cache(true)],
            vec![recorder.handler()],
        )
        .unwrap();
    assert_eq!(recorder.sorted_ints(), vec![2, 3, 4]);
}

#[test]
fn test_failing_item_ends_stream() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = Scheduler::builder()
        .streaming(true)
        .error_policy(workerloop::ErrorPolicy::Dispatch)
        .queue_timeout(Duration::from_millis(20))
        .build();
    let faulty = |_: &Args| -> anyhow::Result<Outcome> {
        Ok(Outcome::try_iter(vec![
            Ok(json!(1)),
            Err(anyhow::anyhow!("sensor offline")),
            Ok(json!(3)),
        ]))
    };

    scheduler
        .run_until_complete([Task::call(faulty)], vec![recorder.handler()])
        .unwrap();

    assert_eq!(recorder.values(), vec![json!(1)]);
    assert_eq!(
        recorder.errors(),
        vec![TaskError::Stream("sensor offline".to_string())]
    );
}

#[test]
fn test_stop_abandons_endless_stream() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    scheduler.handlers().add(recorder.handler());
    scheduler.start().unwrap();

    scheduler
        .add_event(Task::call(|_: &Args| Ok(Outcome::iter(0i64..))).key("endless"))
        .unwrap();
    assert!(recorder.wait_for(10, Duration::from_secs(5)));

    scheduler.stop();
    assert!(!scheduler.is_worker_alive());
    assert_eq!(scheduler.task_queue().unfinished(), 0);
}

#[test]
fn test_stream_without_output_still_finishes() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = streaming();
    scheduler
        .run_until_complete(
            [Task::call(count).arg(50).has_output(false)],
            vec![recorder.handler()],
        )
        .unwrap();
    assert!(recorder.is_empty());
}
