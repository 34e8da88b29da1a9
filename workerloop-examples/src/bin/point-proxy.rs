// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use workerloop::{Args, Outcome, Proxy, Remote, Scheduler, TaskError};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Delay of the slow move in milliseconds
    #[arg(long, default_value_t = 300)]
    delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Point {
    x: f64,
    y: f64,
    z: f64,
    #[serde(skip)]
    delay_ms: u64,
}

impl Remote for Point {
    fn invoke(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        match method {
            "move" => {
                thread::sleep(Duration::from_millis(self.delay_ms));
                self.x += args.f64(0)?;
                self.y += args.f64(1)?;
                Ok(Outcome::none())
            }
            "set_z" => {
                self.z = args.f64(0)?;
                Ok(Outcome::none())
            }
            "get_z" => Ok(Outcome::value(self.z)),
            _ => Err(TaskError::unknown_method("Point", method).into()),
        }
    }

    // delay_ms is not serialized, so coordinates are assigned in place.
    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), TaskError> {
        let coordinate = match name {
            "x" => &mut self.x,
            "y" => &mut self.y,
            "z" => &mut self.z,
            _ => {
                return Err(TaskError::UnknownAttribute {
                    type_name: "Point".to_string(),
                    name: name.to_string(),
                })
            }
        };
        *coordinate = value.as_f64().ok_or_else(|| TaskError::Attribute {
            name: name.to_string(),
            reason: format!("expected a number, got {value}"),
        })?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let cli = Cli::parse();

    let scheduler = Arc::new(
        Scheduler::builder()
            .name("point")
            .queue_timeout(Duration::from_millis(100))
            .build(),
    );
    let delay_ms = cli.delay_ms;
    let point = Proxy::new(&scheduler, &["x", "y"], &["get_z"], move || Point {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        delay_ms,
    })?;
    point.mp_wait();
    println!("created: {:?}", point.mirror_snapshot());

    point.call("move", [1.5, -2.0])?;
    println!("before sync: x={:?}", point.get("x"));
    point.mp_wait();
    println!("after sync:  x={:?} y={:?}", point.get("x"), point.get("y"));

    point.call_with_sync("set_z", [4.0], &[])?;
    point.mp_wait();
    println!("z without getter sync: {:?}", point.get("get_z"));
    point.call("move", [0.0, 0.0])?;
    point.mp_wait();
    println!("z after full sync: {:?}", point.get("get_z"));

    point.set("x", 10.0)?;
    println!("x after set: {:?}", point.get("x"));
    point.call("move", [1.0, 1.0])?;
    point.mp_wait();
    println!("after a slow move: x={:?} y={:?}", point.get("x"), point.get("y"));
    scheduler.close();
    Ok(())
}
