//! Dedicated worker thread that compiles and renders programs.
//!
//! The coordinator talks to the worker only through channels: each job
//! carries its own `oneshot` reply, so a response can only reach the caller
//! that submitted the request. The worker runs one job at a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::config::{FiddleConfig, Scheduling};
use crate::error::{RunError, SandboxError};
use crate::protocol::{PixelBuffer, RunId, RunRequest, RunResponse};
use crate::raster::{self, ExecutionContext};

/// Worker stack size. Compiling walks the syntax tree recursively, and
/// debug builds use far more stack per frame than release builds.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

struct Job {
    id: RunId,
    request: RunRequest,
    reply: oneshot::Sender<Result<RunResponse, SandboxError>>,
}

/// Handle to the sandbox worker. Dropping every handle stops the worker
/// once its current job finishes.
pub struct Sandbox {
    jobs: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl Sandbox {
    pub fn spawn(config: FiddleConfig) -> std::io::Result<Self> {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("fiddle-sandbox".into())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || worker_loop(&config, rx))?;
        tracing::info!("sandbox worker started");
        Ok(Self { jobs, worker })
    }

    /// Submit a request and wait for its result.
    pub async fn run(&self, id: RunId, request: RunRequest) -> Result<RunResponse, SandboxError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { id, request, reply })
            .map_err(|_| SandboxError::Closed)?;
        rx.await.map_err(|_| SandboxError::Closed)?
    }

    /// Close the job channel and wait for the worker to drain.
    pub fn shutdown(self) {
        let Self { jobs, worker } = self;
        drop(jobs);
        if worker.join().is_err() {
            tracing::error!("sandbox worker panicked");
        }
    }
}

fn worker_loop(config: &FiddleConfig, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(mut job) = rx.blocking_recv() {
        if config.scheduling == Scheduling::Latest {
            while let Ok(newer) = rx.try_recv() {
                tracing::debug!(id = %job.id, by = %newer.id, "request superseded");
                let _ = job.reply.send(Err(SandboxError::Superseded));
                job = newer;
            }
        }
        let response = RunResponse::from(execute_request(config, &job.request));
        // The caller may have stopped waiting; nothing to do then.
        let _ = job.reply.send(Ok(response));
    }
    tracing::info!("sandbox worker stopped");
}

/// Validate, compile and render one request inside a panic boundary.
///
/// The execution context lives only for the duration of this call.
#[tracing::instrument(skip_all, fields(grid_size = request.grid_size, program_len = request.program.len()))]
pub fn execute_request(config: &FiddleConfig, request: &RunRequest) -> Result<PixelBuffer, RunError> {
    let grid_size = validate_grid_size(request.grid_size, config.max_grid_size)?;
    let start = Instant::now();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let program = raster::compile(&request.program)?;
        let mut ctx = ExecutionContext::new(&config.noise);
        raster::render(&program, grid_size, &mut ctx)
    }))
    .unwrap_or_else(|payload| Err(RunError::internal(panic_message(payload.as_ref()))));

    match &result {
        Ok(_) => tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "run complete"),
        Err(RunError::Compile { count, .. }) => tracing::warn!(count, "program failed to compile"),
        Err(RunError::Runtime { x, y, .. }) => tracing::warn!(x, y, "program failed at pixel"),
        Err(e) => tracing::warn!(error = %e, "run failed"),
    }
    result
}

fn validate_grid_size(grid_size: i64, max: u32) -> Result<u32, RunError> {
    match u32::try_from(grid_size) {
        Ok(size) if size > 0 && size <= max => Ok(size),
        _ => Err(RunError::invalid_request(format!(
            "grid size must be between 1 and {max}, got {grid_size}"
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "evaluator panicked".to_string()
    }
}
