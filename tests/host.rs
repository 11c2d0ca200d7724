use cache_trace_rs::config::DEFAULT_LATENCY_SIZES;
use cache_trace_rs::{Command, Error, HostState, MeasureConfig, MeasurementHost, WorkerResult};
use std::sync::Arc;
use std::thread;

fn quick_config() -> MeasureConfig {
    MeasureConfig {
        llc_size: 64 * 512,
        trace_duration_ms: 200,
        slice_period_ms: 10,
        latency_sizes: vec![1, 10, 100, 1_000],
        ..Default::default()
    }
}

#[test]
fn second_start_while_running_is_rejected() {
    let host = MeasurementHost::new(quick_config()).unwrap();

    let running = host.start(Command::TraceSweep).unwrap();
    assert_eq!(host.state(), HostState::Running(Command::TraceSweep));
    assert!(host.is_running());
    assert_eq!(running.command(), Command::TraceSweep);
    assert!(matches!(host.start(Command::ProfileLatency), Err(Error::Busy)));
    assert!(matches!(host.start(Command::TraceSweep), Err(Error::Busy)));

    let trace = running.wait().unwrap().into_trace().unwrap();
    assert_eq!(trace.len(), 20);
    assert_eq!(host.state(), HostState::Completed(Command::TraceSweep));
    assert!(!host.is_running());
    assert_eq!(trace.period(), host.config().slice_period());

    // idle again once the result is collected
    assert_eq!(host.profile_latency().unwrap().len(), 4);
}

#[test]
fn concurrent_callers_never_overlap() {
    let host = Arc::new(MeasurementHost::new(quick_config()).unwrap());

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let host = Arc::clone(&host);
            thread::spawn(move || host.start(Command::TraceSweep).map(|run| run.wait()))
        })
        .collect();
    let outcomes: Vec<_> = callers.into_iter().map(|c| c.join().unwrap()).collect();

    let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o, Err(Error::Busy)))
        .count();
    assert!(accepted >= 1);
    assert_eq!(accepted + rejected, 4);
}

#[test]
fn trace_result_posts_tagged_message() {
    let host = MeasurementHost::new(quick_config()).unwrap();
    let result = host.start(Command::TraceSweep).unwrap().wait().unwrap();

    let message = serde_json::to_value(&result).unwrap();
    assert_eq!(message["type"], "trace");
    assert_eq!(message["data"].as_array().unwrap().len(), 20);
    assert_eq!(message["period_ms"], 10);
    assert!(matches!(result, WorkerResult::Trace(_)));
}

#[test]
fn default_sizes_each_get_one_median() {
    // full default sweep minus the two largest sizes, which allocate 64 MB and 640 MB
    let mut config = quick_config();
    config.latency_sizes = MeasureConfig::default().latency_sizes[..6].to_vec();
    let host = MeasurementHost::new(config.clone()).unwrap();

    let table = host.profile_latency().unwrap();
    let sizes: Vec<_> = table.iter().map(|(lines, _)| lines).collect();
    assert_eq!(sizes, config.latency_sizes);
}

#[test]
fn all_default_sizes_each_get_one_median() {
    // one-byte lines keep the 10M-line working set at 10 MB
    let config = MeasureConfig {
        line_size: 1,
        latency_sizes: DEFAULT_LATENCY_SIZES.to_vec(),
        ..quick_config()
    };
    let host = MeasurementHost::new(config).unwrap();

    let table = host.profile_latency().unwrap();
    let sizes: Vec<_> = table.iter().map(|(lines, _)| lines).collect();
    assert_eq!(sizes, DEFAULT_LATENCY_SIZES);
    assert!(table.iter().all(|(_, ms)| ms.is_finite() && ms >= 0.0));
}

#[test]
fn abandoned_run_leaves_host_usable() {
    let host = MeasurementHost::new(quick_config()).unwrap();
    drop(host.start(Command::ProfileLatency).unwrap());

    assert!(matches!(host.state(), HostState::Failed(_)));
    assert!(host.profile_latency().is_ok());
}
