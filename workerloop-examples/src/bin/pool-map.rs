// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;
use workerloop::{Args, Outcome, Pool};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Number of inputs to square
    #[arg(long, default_value_t = 16)]
    items: i64,

    /// Simulated work per item in milliseconds
    #[arg(long, default_value_t = 50)]
    work_ms: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let cli = Cli::parse();

    let squares = Arc::new(Mutex::new(Vec::new()));
    let sink = squares.clone();
    let pool = Pool::builder(cli.workers)
        .queue_timeout(Duration::from_millis(100))
        .output_handler(move |result| {
            if let Some(value) = result.value.as_ref().and_then(|value| value.as_i64()) {
                sink.lock().unwrap_or_else(|err| err.into_inner()).push(value);
            }
            true
        })
        .build_pool();

    let work = Duration::from_millis(cli.work_ms);
    let started = Instant::now();
    let session = pool.session()?;
    pool.map(
        move |args: &Args| {
            thread::sleep(work);
            let n = args.i64(0)?;
            Ok(Outcome::value(n * n))
        },
        (0..cli.items).map(|n| [n]),
    )?;
    drop(session);

    let mut squares = squares.lock().unwrap_or_else(|err| err.into_inner()).clone();
    squares.sort_unstable();
    info!(
        "{} item(s) on {} worker(s) took {:?}",
        squares.len(),
        pool.workers(),
        started.elapsed()
    );
    println!("{squares:?}");
    Ok(())
}
