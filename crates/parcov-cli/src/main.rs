//! parcov - replay parallel executor events through the coverage aggregator
//!
//! ## Commands
//!
//! - `replay`: feed a recorded raw event stream (one JSON event per line)
//!   through the aggregator and print the logical event stream
//! - `check-config`: load and validate a parallel options file

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};

use parcov_core::registry::JSON_LINES_REPORTER;
use parcov_core::{
    CoverageAggregator, JsonLinesReporter, ParallelOptions, RawEvent, ReporterRegistry,
};

#[derive(Parser)]
#[command(name = "parcov")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel coverage aggregation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a raw event stream and print the aggregated logical events
    Replay {
        /// Parallel options file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Raw event stream, one JSON event per line
        #[arg(short, long)]
        events: PathBuf,

        /// Override the expected executor count from the config file
        #[arg(long, env = "PARCOV_EXECUTORS")]
        executors: Option<usize>,

        /// Write logical events here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and validate a parallel options file
    CheckConfig {
        /// Parallel options file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReplaySummary {
    events: usize,
    exit_relayed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    parcov_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Replay {
            config,
            events,
            executors,
            output,
        } => cmd_replay(&config, &events, executors, output.as_deref()).await,
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

fn load_options(path: &Path, executors: Option<usize>) -> Result<ParallelOptions> {
    let mut options = ParallelOptions::from_path(path)
        .with_context(|| format!("Failed to load parallel options from {:?}", path))?;
    if let Some(executors) = executors {
        options.executors = executors;
        options.validate().context("Invalid --executors override")?;
    }
    Ok(options)
}

async fn cmd_replay(
    config: &Path,
    events: &Path,
    executors: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let options = load_options(config, executors)?;
    let registry = ReporterRegistry::with_builtin();

    let sink: Option<Box<dyn Write + Send>> = match output {
        Some(path) => Some(Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        ))),
        None => None,
    };
    let mut aggregator = replay_aggregator(options, &registry, sink, || Box::new(io::stdout()))?;

    let reader = BufReader::new(
        File::open(events).with_context(|| format!("Failed to open {:?}", events))?,
    );
    let summary = replay_events(&mut aggregator, reader).await?;

    info!(
        events = summary.events,
        reporters = aggregator.reporter_names().len(),
        "replay finished"
    );
    Ok(())
}

/// Build the aggregator for a replay. Logical events go to `output` when
/// given; otherwise to stdout, unless the configured `json-lines` reporter
/// already writes there.
fn replay_aggregator<F>(
    options: ParallelOptions,
    registry: &ReporterRegistry,
    output: Option<Box<dyn Write + Send>>,
    stdout: F,
) -> Result<CoverageAggregator>
where
    F: FnOnce() -> Box<dyn Write + Send>,
{
    let prints_to_stdout = options
        .coverage_reporters
        .iter()
        .any(|name| name == JSON_LINES_REPORTER);
    let mut aggregator = CoverageAggregator::from_registry(options, registry)
        .context("Failed to instantiate coverage reporters")?;

    let sink = match output {
        Some(sink) => Some(sink),
        None if prints_to_stdout => None,
        None => Some(stdout()),
    };
    if let Some(sink) = sink {
        aggregator.add_reporter(Box::new(JsonLinesReporter::new("output", sink)));
    }
    debug!(reporters = ?aggregator.reporter_names(), "replay reporters ready");
    Ok(aggregator)
}

/// Dispatch every event in `reader`. If the stream does not end with an
/// exit event, exit is relayed anyway so reporters can flush.
async fn replay_events<R: BufRead>(
    aggregator: &mut CoverageAggregator,
    reader: R,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary {
        events: 0,
        exit_relayed: false,
    };

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: RawEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", line_no))?;
        let is_exit = matches!(event, RawEvent::Exit);
        aggregator
            .dispatch(event)
            .await
            .with_context(|| format!("Aggregation failed on line {}", line_no))?;

        summary.events += 1;
        summary.exit_relayed |= is_exit;
    }

    if !summary.exit_relayed {
        aggregator
            .on_exit()
            .await
            .context("Reporters failed to exit cleanly")?;
        summary.exit_relayed = true;
    }
    Ok(summary)
}

fn cmd_check_config(config: &Path) -> Result<()> {
    let options = load_options(config, None)?;
    let registry = ReporterRegistry::with_builtin();

    println!("executors: {}", options.executors);
    println!("aliases:");
    for (name, id) in &options.browser_id_alias {
        println!("  {} -> {}", name, id);
    }
    println!("reporters:");
    for name in &options.coverage_reporters {
        let status = if registry.contains(name) {
            "ok"
        } else {
            "unknown"
        };
        println!("  {} ({})", name, status);
    }

    if let Some(missing) = options
        .coverage_reporters
        .iter()
        .find(|name| !registry.contains(name))
    {
        anyhow::bail!("Unknown coverage reporter: {}", missing);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcov_core::{RecordedEvent, RecordingReporter};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Writer shared between every reporter standing in for stdout.
    #[derive(Clone, Default)]
    struct SharedStdout(Arc<Mutex<Vec<u8>>>);

    impl SharedStdout {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedStdout {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn stdout_registry(stdout: &SharedStdout) -> ReporterRegistry {
        let mut registry = ReporterRegistry::new();
        let sink = stdout.clone();
        registry.register(JSON_LINES_REPORTER, move |_| {
            Box::new(JsonLinesReporter::new(JSON_LINES_REPORTER, sink.clone()))
        });
        registry
    }

    const TWO_EXECUTOR_STREAM: &str = concat!(
        "{\"event\":\"run_start\"}\n",
        "{\"event\":\"browser_start\",\"browser\":{\"name\":\"Chrome\",\"id\":\"0\"}}\n",
        "{\"event\":\"browser_start\",\"browser\":{\"name\":\"Chrome\",\"id\":\"1\"}}\n",
        "{\"event\":\"browser_complete\",\"browser\":{\"name\":\"Chrome\",\"id\":\"0\"},\"result\":{\"coverage\":{}}}\n",
        "{\"event\":\"browser_complete\",\"browser\":{\"name\":\"Chrome\",\"id\":\"1\"},\"result\":{\"coverage\":{}}}\n",
        "{\"event\":\"run_complete\",\"browsers\":[{\"name\":\"Chrome\",\"id\":\"0\"},{\"name\":\"Chrome\",\"id\":\"1\"}]}\n",
        "{\"event\":\"exit\"}\n",
    );

    fn count_kind(lines: &[String], kind: &str) -> usize {
        let tag = format!("\"event\":\"{}\"", kind);
        lines.iter().filter(|line| line.contains(&tag)).count()
    }

    #[tokio::test]
    async fn test_replay_with_configured_json_lines_prints_each_event_once() {
        let stdout = SharedStdout::default();
        let registry = stdout_registry(&stdout);
        let options = ParallelOptions::new(2).with_reporter(JSON_LINES_REPORTER);
        let sink = stdout.clone();
        let mut agg =
            replay_aggregator(options, &registry, None, move || Box::new(sink)).unwrap();
        assert_eq!(agg.reporter_names(), vec![JSON_LINES_REPORTER]);

        let summary = replay_events(&mut agg, Cursor::new(TWO_EXECUTOR_STREAM))
            .await
            .unwrap();
        assert_eq!(summary.events, 7);

        let lines = stdout.lines();
        assert_eq!(lines.len(), 5);
        for kind in ["run_start", "browser_start", "browser_complete", "run_complete", "exit"] {
            assert_eq!(count_kind(&lines, kind), 1, "{} printed more than once", kind);
        }
    }

    #[tokio::test]
    async fn test_replay_without_reporters_prints_to_stdout() {
        let stdout = SharedStdout::default();
        let registry = stdout_registry(&stdout);
        let sink = stdout.clone();
        let mut agg =
            replay_aggregator(ParallelOptions::new(2), &registry, None, move || Box::new(sink))
                .unwrap();
        assert_eq!(agg.reporter_names(), vec!["output"]);

        replay_events(&mut agg, Cursor::new(TWO_EXECUTOR_STREAM))
            .await
            .unwrap();
        assert_eq!(count_kind(&stdout.lines(), "browser_complete"), 1);
    }

    #[tokio::test]
    async fn test_replay_output_sink_added_alongside_json_lines() {
        let stdout = SharedStdout::default();
        let file = SharedStdout::default();
        let registry = stdout_registry(&stdout);
        let options = ParallelOptions::new(2).with_reporter(JSON_LINES_REPORTER);
        let mut agg = replay_aggregator(
            options,
            &registry,
            Some(Box::new(file.clone())),
            || panic!("stdout sink not expected"),
        )
        .unwrap();
        assert_eq!(agg.reporter_names(), vec![JSON_LINES_REPORTER, "output"]);

        replay_events(&mut agg, Cursor::new(TWO_EXECUTOR_STREAM))
            .await
            .unwrap();
        assert_eq!(count_kind(&stdout.lines(), "browser_complete"), 1);
        assert_eq!(count_kind(&file.lines(), "browser_complete"), 1);
    }

    fn aggregator(executors: usize) -> (CoverageAggregator, parcov_core::RecordedEvents) {
        let recorder = RecordingReporter::named("recorder");
        let events = recorder.events();
        let agg = CoverageAggregator::new(ParallelOptions::new(executors), vec![Box::new(recorder)])
            .expect("aggregator");
        (agg, events)
    }

    #[tokio::test]
    async fn test_replay_skips_blank_lines_and_relays_exit() {
        let (mut agg, events) = aggregator(1);
        let stream = concat!(
            "{\"event\":\"run_start\"}\n",
            "\n",
            "{\"event\":\"browser_start\",\"browser\":{\"name\":\"Chrome\",\"id\":\"0\"}}\n",
        );

        let summary = replay_events(&mut agg, Cursor::new(stream)).await.unwrap();
        assert_eq!(summary.events, 2);
        assert!(summary.exit_relayed);
        assert_eq!(events.snapshot().last(), Some(&RecordedEvent::Exit));
    }

    #[tokio::test]
    async fn test_replay_reports_bad_line() {
        let (mut agg, _) = aggregator(1);
        let stream = "{\"event\":\"run_start\"}\n{\"event\":\"teleport\"}\n";

        let err = replay_events(&mut agg, Cursor::new(stream)).await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_replay_stops_on_duplicate_completion() {
        let (mut agg, _) = aggregator(2);
        let complete =
            "{\"event\":\"browser_complete\",\"browser\":{\"name\":\"Chrome\",\"id\":\"0\"},\"result\":{\"coverage\":{}}}\n";
        let stream = format!(
            "{}{}{}{}",
            "{\"event\":\"run_start\"}\n",
            "{\"event\":\"browser_start\",\"browser\":{\"name\":\"Chrome\",\"id\":\"0\"}}\n",
            complete,
            complete
        );

        let err = replay_events(&mut agg, Cursor::new(stream)).await.unwrap_err();
        assert!(err.to_string().contains("line 4"));
        assert!(format!("{:#}", err).contains("duplicate completion"));
    }

    #[test]
    fn test_load_options_override() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "executors": 2, "browserIdAlias": {{ "Chrome": "C1" }} }}"#).unwrap();

        let options = load_options(file.path(), Some(4)).unwrap();
        assert_eq!(options.executors, 4);
        assert!(load_options(file.path(), Some(0)).is_err());
    }

    #[test]
    fn test_check_config_rejects_unknown_reporter() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "executors = 1\ncoverageReporters = [\"cobertura\"]").unwrap();

        let err = cmd_check_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("cobertura"));
    }
}
