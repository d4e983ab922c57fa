use anyhow::bail;
use clap::{Parser, Subcommand};
use core::time::Duration;
use sequin::ParallelConfig;

/// Runtime configuration for the `sequin` binary.
///
/// Every knob of the parallel engine is exposed so its ordering modes,
/// back-pressure and shutdown behavior can be observed on real input. Values
/// are parsed from CLI arguments or environment variables (a `.env` file is
/// loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sequin",
    version,
    about = "Runs a parallel pipeline over lines of input"
)]
pub struct CliArgs {
    /// The per-record operation to run.
    #[command(subcommand)]
    pub command: Command,

    /// Number of worker threads. `0` uses the host parallelism.
    ///
    /// Environment variable: `SEQUIN_CONCURRENCY`
    #[arg(long, env = "SEQUIN_CONCURRENCY", default_value_t = 0)]
    pub concurrency: usize,

    /// Emit records in completion order instead of input order.
    ///
    /// Environment variable: `SEQUIN_UNORDERED`
    #[arg(long, env = "SEQUIN_UNORDERED", default_value_t = false)]
    pub unordered: bool,

    /// Depth of the work queue. `0` uses twice the worker count.
    ///
    /// Environment variable: `SEQUIN_BUFFER_SIZE`
    #[arg(long, env = "SEQUIN_BUFFER_SIZE", default_value_t = 0)]
    pub buffer_size: usize,

    /// Reorder window for ordered output. `0` reorders without a bound.
    ///
    /// Bounds memory under skew at the cost of parallelism across windows.
    ///
    /// Environment variable: `SEQUIN_CHUNK_SIZE`
    #[arg(long, env = "SEQUIN_CHUNK_SIZE", default_value_t = 0)]
    pub chunk_size: usize,

    /// Read input this many records ahead on a separate thread. `0` disables
    /// prefetching.
    ///
    /// Environment variable: `SEQUIN_PREFETCH`
    #[arg(long, env = "SEQUIN_PREFETCH", default_value_t = 0)]
    pub prefetch: usize,

    /// Stop after writing this many records.
    ///
    /// Environment variable: `SEQUIN_LIMIT`
    #[arg(long, env = "SEQUIN_LIMIT")]
    pub limit: Option<usize>,

    /// Stop admitting records after this many milliseconds.
    ///
    /// Environment variable: `SEQUIN_TIMEOUT_MS`
    #[arg(long, env = "SEQUIN_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Hashing rounds per record for `digest`; raises the cost per record.
    ///
    /// Environment variable: `SEQUIN_ROUNDS`
    #[arg(long, env = "SEQUIN_ROUNDS", default_value_t = 1)]
    pub rounds: u32,

    /// Upper bound of a random delay added to every record, to simulate
    /// skewed completion times.
    ///
    /// Environment variable: `SEQUIN_JITTER_MS`
    #[arg(long, env = "SEQUIN_JITTER_MS", default_value_t = 0)]
    pub jitter_ms: u64,

    /// Generate the records `0..N` instead of reading stdin.
    ///
    /// Environment variable: `SEQUIN_RANGE`
    #[arg(long, env = "SEQUIN_RANGE")]
    pub range: Option<u64>,

    /// Print the engine counters as JSON to stderr when done.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prints a hash of every record, followed by the record.
    Digest,
    /// Prints the records containing `pattern`.
    Grep {
        /// Substring to look for.
        pattern: String,
        /// Print the records that do not contain `pattern` instead.
        #[arg(short = 'v', long, default_value_t = false)]
        invert: bool,
    },
    /// Prints every whitespace-separated word, one per line.
    Words,
}

/// Where records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Stdin,
    Range(u64),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub command: Command,
    pub input: Input,
    pub parallel: ParallelConfig,
    pub prefetch: Option<usize>,
    pub limit: Option<usize>,
    pub timeout: Option<Duration>,
    pub rounds: u32,
    pub jitter: Duration,
    pub stats: bool,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.rounds == 0 {
            bail!("SEQUIN_ROUNDS must be greater than 0");
        }

        if args.unordered && args.chunk_size > 0 {
            bail!(
                "SEQUIN_CHUNK_SIZE ({}) only applies to ordered output; drop it or --unordered",
                args.chunk_size
            );
        }

        if args.timeout_ms == Some(0) {
            bail!("SEQUIN_TIMEOUT_MS must be greater than 0");
        }

        if let Command::Grep { pattern, .. } = &args.command {
            if pattern.is_empty() {
                bail!("grep pattern must not be empty");
            }
        }

        let mut parallel = ParallelConfig::new()
            .with_ordered(!args.unordered)
            .with_chunk_size(args.chunk_size);
        // Zero means "use the default"; leave those knobs unset.
        if args.concurrency > 0 {
            parallel = parallel.with_concurrency(args.concurrency);
        }
        if args.buffer_size > 0 {
            parallel = parallel.with_buffer_size(args.buffer_size);
        }

        let timeout = args.timeout_ms.map(Duration::from_millis);
        if let Some(timeout) = timeout {
            parallel = parallel.with_timeout(timeout);
        }

        Ok(Self {
            command: args.command,
            input: args.range.map_or(Input::Stdin, Input::Range),
            parallel,
            prefetch: (args.prefetch > 0).then_some(args.prefetch),
            limit: args.limit,
            timeout,
            rounds: args.rounds,
            jitter: Duration::from_millis(args.jitter_ms),
            stats: args.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<RunConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("sequin").chain(args.iter().copied()))?;
        RunConfig::try_from(args)
    }

    #[test]
    fn defaults_leave_the_engine_on_auto() {
        let config = parse(&["digest"]).unwrap();
        assert_eq!(config.command, Command::Digest);
        assert_eq!(config.input, Input::Stdin);
        assert_eq!(config.prefetch, None);
        assert_eq!(config.limit, None);

        let settings = config.parallel.resolve();
        assert_eq!(settings.concurrency, sequin::default_concurrency());
        assert!(settings.ordered);
        assert_eq!(settings.chunk_size, 0);
    }

    #[test]
    fn engine_knobs_are_forwarded() {
        let config = parse(&[
            "--concurrency",
            "3",
            "--buffer-size",
            "5",
            "--chunk-size",
            "7",
            "--prefetch",
            "16",
            "--range",
            "100",
            "grep",
            "-v",
            "1",
        ])
        .unwrap();

        let settings = config.parallel.resolve();
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.buffer_size, 5);
        assert_eq!(settings.chunk_size, 7);
        assert_eq!(config.prefetch, Some(16));
        assert_eq!(config.input, Input::Range(100));
        assert_eq!(
            config.command,
            Command::Grep {
                pattern: "1".into(),
                invert: true
            }
        );
    }

    #[test]
    fn timeout_arms_the_engine() {
        let config = parse(&["--timeout-ms", "250", "words"]).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert!(config.parallel.resolve().cancel.deadline().is_some());
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(parse(&["--rounds", "0", "digest"]).is_err());
        assert!(parse(&["--unordered", "--chunk-size", "4", "digest"]).is_err());
        assert!(parse(&["--timeout-ms", "0", "digest"]).is_err());
        assert!(parse(&["grep", ""]).is_err());
        assert!(parse(&[]).is_err());
    }
}
