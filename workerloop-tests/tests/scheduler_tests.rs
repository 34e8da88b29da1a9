// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use workerloop::{
    Args, ErrorPolicy, Outcome, Scheduler, SchedulerConfig, Task, TaskError, TaskKind, TaskQueue,
};
use workerloop_tests::fixtures::{plus_one, Counter};
use workerloop_tests::init_logging;
use workerloop_tests::recorder::Recorder;

fn quick() -> workerloop::SchedulerBuilder {
    Scheduler::builder().queue_timeout(Duration::from_millis(20))
}

#[test]
fn test_results_keep_submission_order() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = quick().build();
    scheduler.handlers().add(recorder.handler());

    let tasks = (0..100).map(|i| Task::call(plus_one).arg(i));
    scheduler.run_until_complete(tasks, Vec::new()).unwrap();

    let expected: Vec<_> = (1..=100).map(|i| json!(i)).collect();
    assert_eq!(recorder.values(), expected);
}

#[test]
fn test_keys_and_task_info_travel_with_results() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = quick().build();
    let counter = workerloop::ObjectRef::new(Counter::default());

    scheduler
        .run_until_complete(
            [
                Task::call(plus_one).arg(1).key("call"),
                Task::method(&counter, "increment").key("method"),
            ],
            vec![recorder.handler()],
        )
        .unwrap();

    let results = recorder.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].key(), Some("call"));
    assert_eq!(results[0].task.kind, TaskKind::Call);
    assert_eq!(results[1].key(), Some("method"));
    assert_eq!(results[1].task.kind, TaskKind::Method);
    assert_eq!(results[1].stream_index, None);
}

#[test]
fn test_config_from_json() {
    init_logging();
    let config = SchedulerConfig::from_json(
        r#"{ "name": "from-json", "workers": 2, "queue_timeout_ms": 20, "error_policy": "dispatch" }"#,
    )
    .unwrap();
    assert_eq!(config.error_policy, ErrorPolicy::Dispatch);

    let recorder = Recorder::new();
    let scheduler = Scheduler::new(config);
    assert_eq!(scheduler.name(), "from-json");
    scheduler
        .run_until_complete(
            [
                Task::call(plus_one).arg(1),
                Task::call(|_: &Args| anyhow::bail!("broken")),
            ],
            vec![recorder.handler()],
        )
        .unwrap();

    assert_eq!(recorder.len(), 2);
    assert_eq!(recorder.errors(), vec![TaskError::Execution("broken".to_string())]);
}

#[test]
fn test_errors_reach_hook_not_handlers() {
    init_logging();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let recorder = Recorder::new();
    let scheduler = quick()
        .on_error(move |result, err| {
            sink.lock()
                .unwrap()
                .push((result.key.clone(), err.clone()))
        })
        .output_handler({
            let handler = recorder.handler();
            move |result| handler(result)
        })
        .build();

    scheduler
        .run_until_complete(
            [
                Task::variable("missing", "get").key("var"),
                Task::call(|args: &Args| Ok(Outcome::value(args.i64(0)?))).key("no-args"),
                Task::call(plus_one).arg(1).key("fine"),
            ],
            Vec::new(),
        )
        .unwrap();

    assert_eq!(recorder.values(), vec![json!(2)]);
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0.as_deref(), Some("var"));
    assert!(matches!(failures[0].1, TaskError::InvalidTarget(_)));
    assert_eq!(failures[1].0.as_deref(), Some("no-args"));
    assert!(matches!(failures[1].1, TaskError::Argument(_)));
}

#[test]
fn test_consuming_handler_hides_result_from_later_handlers() {
    init_logging();
    let first = Recorder::new();
    let second = Recorder::new();
    let scheduler = quick().build();
    scheduler.handlers().add(first.consumer());
    scheduler.handlers().add(second.handler());

    scheduler
        .run_until_complete([Task::call(plus_one).arg(1)], Vec::new())
        .unwrap();
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn test_shared_task_queue_feeds_other_scheduler() {
    init_logging();
    let queue = TaskQueue::new();
    let feeder = quick().name("feeder").task_queue(queue.clone()).build();
    let recorder = Recorder::new();
    let runner = quick().name("runner").task_queue(queue).build();
    runner.handlers().add(recorder.handler());

    runner.start().unwrap();
    for i in 0..5 {
        feeder.add_event(Task::call(plus_one).arg(i)).unwrap();
    }
    runner.close();

    assert!(!feeder.is_running());
    assert_eq!(recorder.sorted_ints(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_initializer_runs_on_every_start() {
    init_logging();
    let recorder = Recorder::new();
    let scheduler = quick()
        .initializer(|| Ok(vec![workerloop::variable("seen", Counter { count: 100 })]))
        .build();
    scheduler.handlers().add(recorder.handler());

    for _ in 0..2 {
        scheduler.start().unwrap();
        scheduler.add_var_event("seen", "increment", Vec::<i64>::new()).unwrap();
        scheduler.close();
    }
    assert_eq!(recorder.values(), vec![json!(101), json!(101)]);
}
