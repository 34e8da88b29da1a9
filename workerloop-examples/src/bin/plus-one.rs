// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use workerloop::{Args, ObjectRef, Outcome, Remote, Scheduler, Task, TaskError};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// First value passed to plus_one
    #[arg(long, default_value_t = 5)]
    start: i64,

    /// Number of tasks to queue
    #[arg(long, default_value_t = 3)]
    count: i64,

    /// Queue poll timeout in milliseconds
    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tally {
    total: i64,
}

impl Remote for Tally {
    fn invoke(&mut self, method: &str, args: &Args) -> anyhow::Result<Outcome> {
        match method {
            "add" => {
                self.total += args.i64(0)?;
                Ok(Outcome::value(self.total))
            }
            _ => Err(TaskError::unknown_method("Tally", method).into()),
        }
    }
}

fn plus_one(args: &Args) -> anyhow::Result<Outcome> {
    Ok(Outcome::value(args.i64(0)? + 1))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let cli = Cli::parse();

    let scheduler = Scheduler::builder()
        .name("plus-one")
        .queue_timeout(Duration::from_millis(cli.timeout_ms))
        .output_handler(|result| {
            match (result.key(), &result.value) {
                (Some(key), Some(value)) => println!("{key}: {value}"),
                (None, Some(value)) => println!("{value}"),
                _ => {}
            }
            true
        })
        .build();

    let tally = ObjectRef::new(Tally::default());
    let session = scheduler.session()?;
    for value in cli.start..cli.start + cli.count {
        session.add_event(Task::call(plus_one).arg(value).key(format!("plus_one({value})")))?;
        // the worker keeps one Tally, so totals accumulate
        session.add_cache_event(Task::method(&tally, "add").arg(value).key("tally"))?;
    }
    drop(session);

    info!("origin tally is still {}", tally.read(|t| t.total));
    Ok(())
}
