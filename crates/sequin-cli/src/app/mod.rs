//! Pipeline assembly for the `sequin` binary.
//!
//! Records are lines read from stdin (or generated numbers); each runs
//! through one parallel operation and is written to stdout. Read errors
//! travel through the pipeline as values and end the run once they reach
//! the writer.

pub mod config;
pub mod ops;
pub mod telemetry;

use config::{Command, Input, RunConfig};
use sequin::{Flow, ParallelConfig, Sequence, Stats, iter, prelude::*};
use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    time::Instant,
};

type Record = io::Result<String>;

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub written: u64,
    pub timed_out: bool,
}

/// Runs the configured pipeline, writing records to `out`.
pub fn run<W: Write>(config: &RunConfig, stats: Arc<Stats>, out: W) -> anyhow::Result<Summary> {
    let parallel = config.parallel.clone().with_stats(stats);
    let start = Instant::now();

    let written = match config.input {
        Input::Stdin => with_prefetch(stdin_records(), config, parallel, out)?,
        Input::Range(end) => with_prefetch(iter((0..end).map(|n| Ok(n.to_string()))), config, parallel, out)?,
    };

    let timed_out = config
        .timeout
        .is_some_and(|timeout| start.elapsed() >= timeout);
    Ok(Summary { written, timed_out })
}

/// Lines of stdin without their line terminator.
///
/// Reads through the unlocked handle, so the sequence can be driven from
/// the engine's reader thread.
fn stdin_records() -> impl Sequence<Item = Record> + Send {
    let stdin = io::stdin();
    iter(core::iter::from_fn(move || {
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Some(Ok(line))
            }
            Err(e) => Some(Err(e)),
        }
    }))
}

fn with_prefetch<S, W>(source: S, config: &RunConfig, parallel: ParallelConfig, out: W) -> anyhow::Result<u64>
where
    S: Sequence<Item = Record> + Send,
    W: Write,
{
    match config.prefetch {
        Some(depth) => apply(source.prefetch(depth), config, parallel, out),
        None => apply(source, config, parallel, out),
    }
}

fn apply<S, W>(source: S, config: &RunConfig, parallel: ParallelConfig, out: W) -> anyhow::Result<u64>
where
    S: Sequence<Item = Record> + Send,
    W: Write,
{
    let limit = config.limit.unwrap_or(usize::MAX);
    let jitter = config.jitter;

    match &config.command {
        Command::Digest => {
            let rounds = config.rounds;
            let records = source.par_map(parallel, move |record: Record| {
                ops::jitter(jitter);
                record.map(|line| ops::digest(&line, rounds))
            });
            write_records(records.take(limit), out)
        }
        Command::Grep { pattern, invert } => {
            let invert = *invert;
            let records = source.par_filter(parallel, move |record: &Record| {
                ops::jitter(jitter);
                // Errors are kept so they reach the writer.
                record
                    .as_ref()
                    .map_or(true, |line| ops::matches(line, pattern, invert))
            });
            write_records(records.take(limit), out)
        }
        Command::Words => {
            let records = source.par_flat_map(parallel, move |record: Record| {
                ops::jitter(jitter);
                iter(ops::words(record))
            });
            write_records(records.take(limit), out)
        }
    }
}

/// Writes every record on its own line. The first read or write error ends
/// the pipeline and is returned.
fn write_records<S, W>(records: S, out: W) -> anyhow::Result<u64>
where
    S: Sequence<Item = Record>,
    W: Write,
{
    let mut out = io::BufWriter::new(out);
    let mut written = 0_u64;
    let mut failure = None;

    let _ = records.produce(|record| {
        let result = record.and_then(|line| writeln!(out, "{line}"));
        match result {
            Ok(()) => {
                written += 1;
                Flow::Continue
            }
            Err(e) => {
                failure = Some(e);
                Flow::Stop
            }
        }
    });

    if let Some(e) = failure {
        #[cfg(feature = "tracing")]
        tracing::error!(written, "Pipeline stopped on I/O error: {e}");
        return Err(e.into());
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::CliArgs;
    use clap::Parser;

    fn run_range(args: &[&str]) -> (Vec<String>, Summary) {
        let args = CliArgs::try_parse_from(core::iter::once("sequin").chain(args.iter().copied())).unwrap();
        let config = RunConfig::try_from(args).unwrap();
        let mut out = Vec::new();
        let summary = run(&config, Arc::new(Stats::new()), &mut out).unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect();
        (lines, summary)
    }

    #[test]
    fn digest_keeps_input_order() {
        let (lines, summary) = run_range(&["--range", "50", "--concurrency", "4", "--jitter-ms", "2", "digest"]);
        assert_eq!(summary.written, 50);
        for (n, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("  {n}")), "{line} out of order");
        }
    }

    #[test]
    fn grep_in_chunked_mode() {
        let (lines, _) = run_range(&["--range", "40", "--chunk-size", "3", "--prefetch", "4", "grep", "3"]);
        assert_eq!(lines, ["3", "13", "23", "30", "31", "32", "33", "34", "35", "36", "37", "38", "39"]);
    }

    #[test]
    fn limit_stops_the_pipeline() {
        let (lines, summary) = run_range(&["--range", "1000000", "--unordered", "--limit", "5", "words"]);
        assert_eq!(lines.len(), 5);
        assert_eq!(summary.written, 5);
    }

    #[test]
    fn read_errors_end_the_run() {
        let config = RunConfig::try_from(CliArgs::try_parse_from(["sequin", "digest"]).unwrap()).unwrap();
        let source = iter([Ok(String::from("a")), Err(io::Error::other("disk")), Ok(String::from("b"))]);
        let mut out = Vec::new();
        let err = apply(source, &config, ParallelConfig::from(2), &mut out).unwrap_err();
        assert!(err.to_string().contains("disk"));
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
