//! # Measurement host
//!
//! Runs one profiler or tracer at a time on a dedicated OS thread, so multi-second busy loops never
//! block the caller. The worker is optionally pinned to a CPU core and raised to maximum thread
//! priority, receives exactly one [`Command`] and posts back exactly one [`WorkerResult`] over
//! bounded channels. The caller only blocks in [`RunHandle::wait`].
//!
//! The host tracks `Idle -> Running -> {Completed, Failed}`. A second `start` while a run is in
//! flight is rejected with [`Error::Busy`]; runs are never queued or overlapped.
use crate::clock::MonotonicClock;
use crate::config::MeasureConfig;
use crate::error::{Error, Result};
use crate::latency::{LatencyProfiler, LatencyTable};
use crate::protocol::{Command, WorkerResult};
use crate::sweep::{SweepTrace, SweepTracer};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error, info, warn};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Running(Command),
    Completed(Command),
    Failed(String),
}

pub struct MeasurementHost {
    config: MeasureConfig,
    state: Arc<Mutex<HostState>>,
}

fn lock(state: &Mutex<HostState>) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MeasurementHost {
    pub fn new(config: MeasureConfig) -> Result<Self> {
        config.validate()?;
        Ok(MeasurementHost {
            config,
            state: Arc::new(Mutex::new(HostState::Idle)),
        })
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    pub fn state(&self) -> HostState {
        lock(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.state), HostState::Running(_))
    }

    /// Spawn a worker and hand it `command`, returning a handle to await its single result
    pub fn start(&self, command: Command) -> Result<RunHandle> {
        {
            let mut state = lock(&self.state);
            if let HostState::Running(current) = *state {
                warn!("Rejecting '{}': '{}' still running", command, current);
                return Err(Error::Busy);
            }
            *state = HostState::Running(command);
        }

        match self.spawn_worker(command) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("Couldn't start '{}': {}", command, e);
                *lock(&self.state) = HostState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Run a latency profile to completion
    pub fn profile_latency(&self) -> Result<LatencyTable> {
        self.start(Command::ProfileLatency)?.wait()?.into_latency()
    }

    /// Run a sweep trace to completion
    pub fn trace_sweep(&self) -> Result<SweepTrace> {
        self.start(Command::TraceSweep)?.wait()?.into_trace()
    }

    fn spawn_worker(&self, command: Command) -> Result<RunHandle> {
        let (command_tx, command_rx) = bounded::<Command>(1);
        let (result_tx, result_rx) = bounded::<WorkerResult>(1);
        let name = format!("measure-{}", command.as_wire());
        let config = self.config.clone();

        let thread = {
            let worker_name = name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_main(worker_name, config, command_rx, result_tx))
                .map_err(|e| spawn_error(&name, e))?
        };

        command_tx.send(command).map_err(|_| {
            Error::WorkerExecution(format!("worker '{name}' exited before accepting '{command}'"))
        })?;
        debug!("Sent '{}' to worker '{}'", command, name);

        Ok(RunHandle {
            command,
            result_rx,
            thread: Some(thread),
            state: Arc::clone(&self.state),
            started: Instant::now(),
        })
    }
}

fn spawn_error(name: &str, err: std::io::Error) -> Error {
    Error::WorkerExecution(format!("couldn't spawn worker '{name}': {err}"))
}

/// Body of the isolated worker thread: take one command, post one result
fn worker_main(
    name: String,
    config: MeasureConfig,
    command_rx: Receiver<Command>,
    result_tx: Sender<WorkerResult>,
) {
    if let Some(cpu_num) = config.cpu_core {
        let core_num = core_affinity::CoreId { id: cpu_num };
        if !core_affinity::set_for_current(core_num) {
            warn!(
                "Couldn't pin worker '{}' to CPU core {} (NOTE: this is expected on macOS)",
                name, cpu_num
            );
        }
    }

    if thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max).is_err() {
        warn!("Couldn't set worker '{}' to maximum thread priority", name);
    }

    let Ok(command) = command_rx.recv() else {
        warn!("Worker '{}' closed before receiving a command", name);
        return;
    };

    info!("Worker '{}' starting '{}'", name, command);
    let result = run_command(command, config);

    // Err(_) == host went away, nobody is left to read the result
    if result_tx.send(result).is_err() {
        warn!("Worker '{}' result dropped, host no longer listening", name);
    }
    info!("Worker '{}' stopping", name);
}

fn run_command(command: Command, config: MeasureConfig) -> WorkerResult {
    let outcome = match command {
        Command::ProfileLatency => LatencyProfiler::new(config, MonotonicClock::new())
            .profile()
            .map(WorkerResult::Latency),
        Command::TraceSweep => SweepTracer::new(config, MonotonicClock::new())
            .trace()
            .map(WorkerResult::Trace),
    };

    outcome.unwrap_or_else(|e| match e {
        Error::WorkerExecution(msg) => WorkerResult::ExecutionError(msg),
        other => WorkerResult::ExecutionError(other.to_string()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Pending result of one run.
///
/// Dropping a handle without calling [`RunHandle::wait`] still joins the worker (runs can't be
/// cancelled) and leaves the host in `Failed`.
pub struct RunHandle {
    command: Command,
    result_rx: Receiver<WorkerResult>,
    thread: Option<thread::JoinHandle<()>>,
    state: Arc<Mutex<HostState>>,
    started: Instant,
}

impl RunHandle {
    pub fn command(&self) -> Command {
        self.command
    }

    /// Block until the worker posts its result, then release the worker
    pub fn wait(mut self) -> Result<WorkerResult> {
        // Err(_) == worker hung up without sending, inspect the join result for why
        let received = self.result_rx.recv();
        let joined = self.thread.take().map(thread::JoinHandle::join);

        let outcome = match (received, joined) {
            (Ok(WorkerResult::ExecutionError(msg)), _) => Err(Error::WorkerExecution(msg)),
            (Ok(result), _) => self.check_kind(result),
            (Err(_), Some(Err(payload))) => Err(Error::WorkerExecution(format!(
                "worker panicked: {}",
                panic_message(payload.as_ref())
            ))),
            (Err(_), _) => Err(Error::WorkerExecution(
                "worker exited without posting a result".to_string(),
            )),
        };

        self.finish(&outcome);
        outcome
    }

    fn check_kind(&self, result: WorkerResult) -> Result<WorkerResult> {
        let expected = match self.command {
            Command::ProfileLatency => "latency",
            Command::TraceSweep => "trace",
        };
        if result.kind() == expected {
            Ok(result)
        } else {
            Err(Error::Protocol(format!(
                "'{}' answered with a {} result",
                self.command,
                result.kind()
            )))
        }
    }

    fn finish(&self, outcome: &Result<WorkerResult>) {
        let elapsed = self.started.elapsed();
        let mut state = lock(&self.state);
        match outcome {
            Ok(_) => {
                info!("'{}' completed in {:.2?}", self.command, elapsed);
                *state = HostState::Completed(self.command);
            }
            Err(e) => {
                error!("'{}' failed after {:.2?}: {}", self.command, elapsed, e);
                *state = HostState::Failed(e.to_string());
            }
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            warn!("'{}' result abandoned, waiting for worker to finish", self.command);
            let _ = thread.join();
            *lock(&self.state) =
                HostState::Failed(format!("'{}' result was never collected", self.command));
        }
    }
}
