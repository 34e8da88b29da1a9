// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::*;
use crate::error::TaskError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Gauge {
    level: i64,
    label: String,
}

impl Remote for Gauge {}

fn boxed(level: i64) -> Box<dyn RemoteObject> {
    Box::new(Gauge {
        level,
        label: "g".to_string(),
    })
}

#[test]
fn test_handles_are_unique_and_stable() {
    let first = ObjectRef::new(Gauge::default());
    let second = ObjectRef::new(Gauge::default());
    assert_ne!(first.key(), second.key());

    let clone = first.clone();
    assert_eq!(first.key(), clone.key());
    assert!(first.key().to_string().starts_with("obj-"));
    assert_eq!(CacheKey::named("widgets").to_string(), "widgets");
}

#[test]
fn test_install_keeps_existing_entry_unless_forced() {
    let registry = Registry::new();
    let key = CacheKey::named("gauge");

    let live = registry.install(key.clone(), boxed(1), false);
    let again = registry.install(key.clone(), boxed(2), false);
    assert!(live.same_object(&again));
    assert_eq!(live.snapshot()["level"], json!(1));

    let forced = registry.install(key.clone(), boxed(3), true);
    assert!(live.same_object(&forced));
    // replaced in place, earlier handles see the new state
    assert_eq!(live.snapshot()["level"], json!(3));
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(&key).is_some());
    assert!(registry.is_empty());
}

#[test]
fn test_attributes_follow_serde_fields() {
    let mut gauge = Gauge::default();
    Remote::set_attr(&mut gauge, "level", json!(7)).unwrap();
    assert_eq!(gauge.level, 7);
    assert_eq!(Remote::get_attr(&gauge, "level").unwrap(), json!(7));

    let missing = Remote::get_attr(&gauge, "pressure").unwrap_err();
    assert!(matches!(missing, TaskError::UnknownAttribute { .. }));

    let wrong_type = Remote::set_attr(&mut gauge, "level", json!("high")).unwrap_err();
    assert!(matches!(wrong_type, TaskError::Attribute { .. }));
    assert_eq!(gauge.level, 7);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tagged {
    level: i64,
    #[serde(skip_deserializing)]
    tag: String,
}

impl Remote for Tagged {}

#[test]
fn test_lossy_state_rejects_attribute_writes() {
    let mut tagged: Box<dyn RemoteObject> = Box::new(Tagged {
        level: 1,
        tag: "blue".to_string(),
    });
    let err = tagged.set_attr("level", json!(2)).unwrap_err();
    assert!(matches!(err, TaskError::Attribute { ref name, .. } if name == "level"));

    let tagged = tagged.as_any().downcast_ref::<Tagged>().unwrap();
    assert_eq!(tagged.level, 1);
    assert_eq!(tagged.tag, "blue");
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Thermometer {
    reading: i64,
    #[serde(skip)]
    offset: i64,
}

impl Remote for Thermometer {
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
fn test_overridden_set_attr_keeps_skipped_state() {
    let mut thermometer: Box<dyn RemoteObject> = Box::new(Thermometer {
        reading: 20,
        offset: 3,
    });
    thermometer.set_attr("reading", json!(25)).unwrap();
    assert_eq!(thermometer.get_attr("reading").unwrap(), json!(25));

    let thermometer = thermometer.as_any().downcast_ref::<Thermometer>().unwrap();
    assert_eq!(thermometer.offset, 3);
}

#[test]
fn test_default_invoke_knows_no_methods() {
    let mut gauge = Gauge::default();
    let err = gauge
        .call_method("spin", &crate::task::Args::default())
        .unwrap_err();
    assert_eq!(
        TaskError::from_anyhow(err),
        TaskError::unknown_method("Gauge", "spin")
    );
}

#[test]
fn test_erased_transfer_is_a_copy() {
    let origin = ObjectRef::new(Gauge::default());
    let copy = origin.erase().transfer();
    let live = LiveObject::new(copy);
    live.downcast(|gauge: &mut Gauge| gauge.level = 42).unwrap();

    assert_eq!(origin.read(|gauge| gauge.level), 0);
    assert_eq!(live.snapshot()["level"], json!(42));
}

#[test]
fn test_origin_cache_ships_once() {
    let origin = OriginCache::new();
    let key = CacheKey::named("x");
    assert!(origin.ship(&key, false));
    assert!(!origin.ship(&key, false));
    assert!(origin.ship(&key, true));
    assert!(origin.is_shipped(&key));
    assert!(origin.forget(&key));
    assert!(!origin.is_shipped(&key));
}
