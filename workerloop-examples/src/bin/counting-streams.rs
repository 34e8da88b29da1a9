// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use clap::Parser;
use futures::stream;
use log::warn;
use serde_json::json;
use workerloop::{Args, Outcome, Scheduler, Task};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of concurrent counters
    #[arg(long, default_value_t = 3)]
    streams: usize,

    /// How far each counter counts
    #[arg(long, default_value_t = 5)]
    upto: i64,
}

fn count(args: &Args) -> anyhow::Result<Outcome> {
    let upto = args.i64(0)?;
    Ok(Outcome::iter(0..upto))
}

fn letters(args: &Args) -> anyhow::Result<Outcome> {
    let word = args.str(0)?.to_string();
    let chars: Vec<_> = word.chars().map(|c| json!(c.to_string())).collect();
    Ok(Outcome::stream(stream::iter(chars)))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let scheduler = Scheduler::builder()
        .name("streams")
        .streaming(true)
        .queue_timeout(Duration::from_millis(100))
        .output_handler(|result| {
            let key = result.key().unwrap_or("?");
            match (&result.value, &result.error, result.stream_index) {
                (Some(value), _, Some(index)) => println!("{key}[{index}] = {value}"),
                (Some(value), _, None) => println!("{key} = {value}"),
                (_, Some(err), _) => warn!("{key} failed: {err}"),
                _ => {}
            }
            true
        })
        .build();

    let tasks = (0..cli.streams)
        .map(|i| Task::call(count).arg(cli.upto).key(format!("counter-{i}")))
        .chain(std::iter::once(Task::call(letters).arg("stream").key("letters")));
    scheduler.run_until_complete(tasks, Vec::new())?;
    Ok(())
}
