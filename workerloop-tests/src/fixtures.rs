// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use workerloop::{Args, Outcome, Remote, TaskError};

/// Counts calls; `get` reads without changing anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

impl Remote for Counter {
    fn invoke(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        match method {
            "increment" => {
                self.count += 1;
                Ok(Outcome::value(self.count))
            }
            "add" => {
                self.count += args.i64(0)?;
                Ok(Outcome::value(self.count))
            }
            "get" => Ok(Outcome::value(self.count)),
            "count_to" => {
                let upto = args.i64(0)?;
                Ok(Outcome::iter(self.count..upto))
            }
            _ => Err(TaskError::unknown_method("Counter", method).into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Point { x, y, z: 0 }
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
            // slow enough that a read right after the call still sees the old mirror
            "move_slowly" => {
                thread::sleep(Duration::from_millis(150));
                self.x += args.i64(0)?;
                self.y += args.i64(1)?;
                Ok(Outcome::none())
            }
            "set_z" => {
                self.z = args.i64(0)?;
                Ok(Outcome::none())
            }
            "get_z" => Ok(Outcome::value(self.z)),
            _ => Err(TaskError::unknown_method("Point", method).into()),
        }
    }
}

pub fn plus_one(args: &Args) -> anyhow::Result<Outcome> {
    Ok(Outcome::value(args.i64(0)? + 1))
}

/// Sleeps for `args[0]` milliseconds and returns `args[1]`.
pub fn sleepy(args: &Args) -> anyhow::Result<Outcome> {
    thread::sleep(Duration::from_millis(args.i64(0)?.max(0) as u64));
    Ok(Outcome::Value(args.value(1)?.clone()))
}

/// Yields `0..args[0]`.
pub fn count(args: &Args) -> anyhow::Result<Outcome> {
    Ok(Outcome::iter(0..args.i64(0)?))
}
