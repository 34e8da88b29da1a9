// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Proxy;
use crate::cache::Remote;
use crate::engine::Scheduler;
use crate::error::TaskError;
use crate::task::{Args, Outcome, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Point {
    x: i64,
    y: i64,
    z: i64,
}

impl Point {
    fn origin() -> Self {
        Point { x: 1, y: 2, z: 3 }
    }
}

impl Remote for Point {
    fn invoke(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        match method {
            "move" => {
                self.x += args.i64(0)?;
                self.y += args.i64(1)?;
                Ok(Outcome::none())
            }
            "move_slowly" => {
                thread::sleep(Duration::from_millis(100));
                self.x += args.i64(0)?;
                self.y += args.i64(1)?;
                Ok(Outcome::none())
            }
            "get_z" => Ok(Outcome::value(self.z)),
            _ => Err(TaskError::unknown_method("Point", method).into()),
        }
    }
}

fn scheduler() -> Arc<Scheduler> {
    Arc::new(
        Scheduler::builder()
            .name("proxy")
            .queue_timeout(Duration::from_millis(20))
            .build(),
    )
}

#[test]
fn test_mirror_filled_after_creation() {
    let scheduler = scheduler();
    let point = Proxy::new(&scheduler, &["x", "y"], &["get_z"], Point::origin).unwrap();
    assert!(scheduler.is_running());

    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(1)));
    assert_eq!(point.get("y"), Some(json!(2)));
    assert_eq!(point.get("get_z"), Some(json!(3)));
    // z is neither a declared property nor a getter
    assert_eq!(point.get("z"), None);
    assert_eq!(point.mirror_snapshot().len(), 3);
}

#[test]
fn test_read_before_sync_sees_old_value() {
    let scheduler = scheduler();
    let point = Proxy::new(&scheduler, &["x", "y"], &[], Point::origin).unwrap();
    point.mp_wait();

    point.call("move_slowly", [5, 5]).unwrap();
    assert_eq!(point.get("x"), Some(json!(1)));

    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(6)));
    assert_eq!(point.get("y"), Some(json!(7)));
}

#[test]
fn test_set_writes_through() {
    let scheduler = scheduler();
    let point = Proxy::new(&scheduler, &["x", "y"], &[], Point::origin).unwrap();
    point.mp_wait();

    point.set("x", 10).unwrap();
    assert_eq!(point.get("x"), Some(json!(10)));

    point.call("move", [1, 0]).unwrap();
    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(11)));
}

#[test]
fn test_call_with_sync_limits_refresh() {
    let scheduler = scheduler();
    let point = Proxy::builder(&scheduler)
        .property("x")
        .property("y")
        .create(Point::origin)
        .unwrap();
    point.mp_wait();

    point.call_with_sync("move", [1, 1], &["x"]).unwrap();
    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(2)));
    assert_eq!(point.get("y"), Some(json!(2)));

    point.call("move", [0, 0]).unwrap();
    point.mp_wait();
    assert_eq!(point.get("y"), Some(json!(3)));
}

#[test]
fn test_failed_calls_still_resync_mirror() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let scheduler = Arc::new(
        Scheduler::builder()
            .queue_timeout(Duration::from_millis(20))
            .on_error(move |_, err| sink.lock().unwrap().push(err.clone()))
            .build(),
    );
    let point = Proxy::new(&scheduler, &["x", "y"], &[], Point::origin).unwrap();
    point.mp_wait();

    // x moves, then the missing second argument fails the call
    point.call("move", [5]).unwrap();
    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(6)));
    assert_eq!(point.get("y"), Some(json!(2)));

    point.set("x", "far away").unwrap();
    assert_eq!(point.get("x"), Some(json!("far away")));
    point.mp_wait();
    assert_eq!(point.get("x"), Some(json!(6)));

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0], TaskError::Argument(_)));
    assert!(matches!(failures[1], TaskError::Attribute { ref name, .. } if name == "x"));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sensor {
    reading: i64,
    #[serde(skip)]
    calibration: i64,
}

impl Remote for Sensor {
    fn invoke(&mut self, method: &str, _args: &Args) -> anyhow::Result<Outcome> {
        match method {
            "calibration" => Ok(Outcome::value(self.calibration)),
            _ => Err(TaskError::unknown_method("Sensor", method).into()),
        }
    }

    fn set_attr(&mut self, name: &str, value: serde_json::Value) -> Result<(), TaskError> {
        match (name, value.as_i64()) {
            ("reading", Some(reading)) => {
                self.reading = reading;
                Ok(())
            }
            _ => Err(TaskError::Attribute {
                name: name.to_string(),
                reason: format!("cannot assign {value}"),
            }),
        }
    }
}

#[test]
fn test_set_keeps_state_outside_serde() {
    let scheduler = scheduler();
    let sensor = Proxy::new(&scheduler, &["reading"], &["calibration"], || Sensor {
        reading: 1,
        calibration: 42,
    })
    .unwrap();
    sensor.mp_wait();
    assert_eq!(sensor.get("calibration"), Some(json!(42)));

    sensor.set("reading", 5).unwrap();
    sensor.mp_wait();
    assert_eq!(sensor.get("reading"), Some(json!(5)));
    assert_eq!(sensor.get("calibration"), Some(json!(42)));
}

#[test]
fn test_proxy_results_skip_user_handlers() {
    let scheduler = scheduler();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    scheduler.add_output_handler(move |result| {
        sink.lock().unwrap().push(result.key.clone());
        false
    });

    let point = Proxy::new(&scheduler, &["x"], &[], Point::origin).unwrap();
    point.call("move", [1, 1]).unwrap();
    scheduler
        .add_event(
            Task::call(|args: &Args| Ok(Outcome::value(args.i64(0)? * 2)))
                .arg(4)
                .key("double"),
        )
        .unwrap();
    point.mp_wait();

    assert_eq!(*seen.lock().unwrap(), vec![Some("double".to_string())]);
}

#[test]
fn test_dropped_proxy_results_are_swallowed() {
    let scheduler = scheduler();
    let seen = Arc::new(Mutex::new(0));
    let sink = seen.clone();
    scheduler.add_output_handler(move |_| {
        *sink.lock().unwrap() += 1;
        false
    });

    let point = Proxy::new(&scheduler, &["x"], &[], Point::origin).unwrap();
    point.call("move_slowly", [1, 1]).unwrap();
    drop(point);
    scheduler.wait();

    assert_eq!(*seen.lock().unwrap(), 0);
}
