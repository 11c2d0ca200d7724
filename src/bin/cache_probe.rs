//! Cache latency profiling and sweep tracing from the command line
//!
//! `latency` prints the median time to touch every line of working sets from 1 line up to 10M
//! lines; the jump from cache-resident to memory-resident sizes shows up as a step in ns/line.
//! `trace` records sweep counts of an LLC-sized buffer and submits them to the aggregation service
//! for a heatmap.
use cache_trace_rs::session::Session;
use cache_trace_rs::{LatencyTable, MeasureConfig, Status, WorkerResult, format_size_fixed_int};
use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "cache_probe", version, about = "Cache latency profiling and sweep tracing")]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// JSON config file, absent fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Aggregation service base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Pin the measurement thread to this CPU core
    #[arg(long, global = true)]
    cpu: Option<usize>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Median full-pass time per working-set size
    Latency,
    /// Sweep-count trace(s) of the LLC-sized working set
    Trace {
        /// Number of traces to record, one after another
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Keep traces local, don't submit them
        #[arg(long)]
        no_ingest: bool,
    },
    /// Save every trace stored by the service as JSON
    Download {
        #[arg(short, long, default_value = "trace_data.json")]
        output: PathBuf,
    },
    /// Clear all results stored by the service
    Clear,
    /// Print the effective configuration and exit
    ShowConfig,
}

fn load_config(args: &Args) -> cache_trace_rs::Result<MeasureConfig> {
    let mut config = match &args.config {
        Some(path) => MeasureConfig::from_json_file(path)?,
        None => MeasureConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if args.cpu.is_some() {
        config.cpu_core = args.cpu;
    }
    config.validate()?;
    Ok(config)
}

fn print_latency_table(table: &LatencyTable, line_size: usize) {
    println!(
        "{:>10} {:>10} {:>14} {:>12}",
        "Lines", "Size", "Median (ms)", "ns/line"
    );
    println!("{:-<10} {:-<10} {:-<14} {:-<12}", "", "", "", "");

    let mut prev_per_line = 0.0f64;
    for (lines, median_ms) in table.iter() {
        let per_line = median_ms * 1e6 / lines as f64;
        // Show jump indicator for significant per-line latency increases
        let jump = if prev_per_line > 0.0 && per_line > prev_per_line * 1.5 {
            " ←"
        } else {
            ""
        };
        println!(
            "{:>10} {:>10} {:>14.6} {:>12.2}{}",
            lines,
            format_size_fixed_int((lines * line_size) as u64),
            median_ms,
            per_line,
            jump
        );
        prev_per_line = per_line;
    }

    println!("\n← indicates significant latency jump (cache level transition)");
}

fn finish(status: &Status) -> ExitCode {
    if status.is_error {
        eprintln!("{}", status.message);
        ExitCode::FAILURE
    } else {
        println!("{}", status.message);
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    debug!("Args: {:?}", args);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Cmd::ShowConfig = args.command {
        return match serde_json::to_string_pretty(&config) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let line_size = config.line_size;
    let mut session = match Session::new(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Cmd::Latency => {
            session.collect_latency();
            if let Some(table) = session.latency_results() {
                if args.json {
                    let result = WorkerResult::Latency(table.clone());
                    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
                } else {
                    print_latency_table(table, line_size);
                }
            }
        }
        Cmd::Trace { count, no_ingest } => {
            for run in 1..=count {
                debug!("Trace run {}/{}", run, count);
                if session.collect_trace_with(!no_ingest).is_error {
                    break;
                }
            }
            if args.json {
                let results: Vec<_> = session
                    .traces()
                    .iter()
                    .cloned()
                    .map(WorkerResult::Trace)
                    .collect();
                println!("{}", serde_json::to_string_pretty(&results).unwrap_or_default());
            } else {
                for trace in session.traces() {
                    println!(
                        "trace: {} slices of {} ms, sweeps/slice min {} max {}",
                        trace.len(),
                        trace.period_ms,
                        trace.min().unwrap_or_default(),
                        trace.max().unwrap_or_default()
                    );
                }
                for record in session.heatmaps() {
                    println!("heatmap: {record}");
                }
            }
        }
        Cmd::Download { ref output } => {
            session.download_traces(output);
        }
        Cmd::Clear => {
            session.clear_results();
        }
        Cmd::ShowConfig => {}
    }

    finish(session.status())
}
