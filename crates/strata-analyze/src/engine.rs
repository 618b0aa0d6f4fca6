//! Analyzer execution engine: a bounded worker pool over a shared job
//! queue, with per-run cancellation flags and guarded state transitions.
//!
//! Workers open their own database connections (SQLite WAL keeps readers
//! concurrent with the single writer), so runs on overlapping event sets
//! proceed independently and every write is attributed to its run. One
//! failing analyzer is captured into its own run row and never takes the
//! engine or its siblings down.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strata_core::db::{open_metadata, runs};
use strata_core::error::{Result, StrataError};
use strata_core::model::run::CANCELLED_DETAIL;
use strata_core::model::AnalyzerRun;
use strata_core::time::now_us;
use strata_search::EventStore;
use tracing::{error, info, warn};

use crate::context::AnalyzerContext;
use crate::registry::AnalyzerRegistry;

/// Worker pool sizing and paging.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Worker threads executing runs.
    pub workers: usize,
    /// Events per page when analyzers stream the sketch.
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            page_size: 200,
        }
    }
}

#[derive(Debug)]
struct Job {
    run_id: i64,
    sketch_id: i64,
    analyzer: String,
    timeline_scope: Option<Vec<i64>>,
}

struct Shared {
    registry: AnalyzerRegistry,
    meta_path: PathBuf,
    events_path: PathBuf,
    page_size: usize,
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
    cancels: Mutex<HashMap<i64, Arc<AtomicBool>>>,
}

/// Recover a usable guard from a poisoned mutex; queue and flag state stay
/// valid across a worker panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The analyzer execution engine.
///
/// Dropping the engine is graceful: workers drain the queue, finish their
/// current runs, and join. Call [`AnalyzerEngine::wait_for_run`] to observe
/// a specific run's completion before dropping.
pub struct AnalyzerEngine {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl AnalyzerEngine {
    /// Start the worker pool.
    #[must_use]
    pub fn new(
        registry: AnalyzerRegistry,
        meta_path: &Path,
        events_path: &Path,
        config: EngineConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry,
            meta_path: meta_path.to_path_buf(),
            events_path: events_path.to_path_buf(),
            page_size: config.page_size.max(1),
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
            cancels: Mutex::new(HashMap::new()),
        });

        let workers = (0..config.workers.max(1))
            .map(|n| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("strata-analyzer-{n}"))
                    .spawn(move || worker_loop(&shared))
                    .unwrap_or_else(|err| panic!("spawn analyzer worker: {err}"))
            })
            .collect();

        Self { shared, workers }
    }

    /// Validate, record, and enqueue a run. Returns the `pending` run row.
    ///
    /// # Errors
    ///
    /// `UnknownAnalyzer` for an unregistered name; `Permission` when the
    /// scheduling user lacks write access on the sketch.
    pub fn schedule(
        &self,
        sketch_id: i64,
        analyzer: &str,
        timeline_scope: Option<Vec<i64>>,
        acting_user: &str,
    ) -> Result<AnalyzerRun> {
        if !self.shared.registry.contains(analyzer) {
            return Err(StrataError::UnknownAnalyzer(analyzer.to_string()));
        }

        let meta = open_metadata(&self.shared.meta_path)?;
        let run = runs::create_pending(
            &meta,
            sketch_id,
            analyzer,
            timeline_scope.as_deref(),
            acting_user,
            now_us(),
        )?;

        lock(&self.shared.cancels).insert(run.run_id, Arc::new(AtomicBool::new(false)));
        lock(&self.shared.queue).push_back(Job {
            run_id: run.run_id,
            sketch_id,
            analyzer: analyzer.to_string(),
            timeline_scope,
        });
        self.shared.work_ready.notify_one();

        info!(run_id = run.run_id, analyzer, "run enqueued");
        Ok(run)
    }

    /// Cancel a pending or started run.
    ///
    /// The run transitions directly to `error` with detail `cancelled`; the
    /// flag set here makes the run's context refuse any further reads and
    /// writes, so once this returns no new annotations from the run appear.
    ///
    /// # Errors
    ///
    /// `RunFinished` when the run already reached a terminal state,
    /// `NotFound` for an unknown id.
    pub fn cancel(&self, run_id: i64) -> Result<AnalyzerRun> {
        if let Some(flag) = lock(&self.shared.cancels).get(&run_id) {
            flag.store(true, Ordering::SeqCst);
        }

        let meta = open_metadata(&self.shared.meta_path)?;
        let run = runs::mark_error(&meta, run_id, CANCELLED_DETAIL, now_us())?;
        info!(run_id, "run cancelled");
        Ok(run)
    }

    /// Current run row.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn run_state(&self, run_id: i64) -> Result<AnalyzerRun> {
        let meta = open_metadata(&self.shared.meta_path)?;
        runs::get(&meta, run_id)
    }

    /// Poll until the run reaches `done` or `error`.
    ///
    /// # Errors
    ///
    /// `Internal` on timeout; `NotFound` for an unknown id.
    pub fn wait_for_run(&self, run_id: i64, timeout: Duration) -> Result<AnalyzerRun> {
        let deadline = Instant::now() + timeout;
        loop {
            let run = self.run_state(run_id)?;
            if run.state.is_terminal() {
                return Ok(run);
            }
            if Instant::now() >= deadline {
                return Err(StrataError::Internal(anyhow::anyhow!(
                    "run {run_id} still '{}' after {timeout:?}",
                    run.state
                )));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Registered analyzers as (name, description) pairs.
    #[must_use]
    pub fn analyzers(&self) -> Vec<(&'static str, &'static str)> {
        self.shared.registry.list()
    }
}

impl Drop for AnalyzerEngine {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("analyzer worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = lock(&shared.queue);
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                queue = match shared.work_ready.wait(queue) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        };

        let Some(job) = job else {
            return;
        };

        let run_id = job.run_id;
        if let Err(err) = execute_job(shared, job) {
            error!(run_id, %err, "job execution failed outside the run");
        }
        lock(&shared.cancels).remove(&run_id);
    }
}

/// Run one job to a terminal state. Errors returned here are engine-side
/// failures (e.g. the store is unreachable); analyzer faults are captured
/// into the run row instead.
fn execute_job(shared: &Shared, job: Job) -> Result<()> {
    let meta = open_metadata(&shared.meta_path)?;
    let store = EventStore::open(&shared.events_path)?;

    let cancel = lock(&shared.cancels)
        .get(&job.run_id)
        .cloned()
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    if cancel.load(Ordering::SeqCst) {
        // Cancelled before pickup; `cancel()` already finalized the row.
        return Ok(());
    }

    let started = runs::mark_started(&meta, job.run_id, now_us());
    match started {
        Ok(_) => {}
        // Cancelled (or otherwise finalized) while still queued.
        Err(StrataError::RunFinished { .. }) => return Ok(()),
        Err(err) => return Err(err),
    }

    let Some(analyzer) = shared.registry.get(&job.analyzer) else {
        finalize_error(
            &meta,
            job.run_id,
            &format!("analyzer '{}' disappeared from the registry", job.analyzer),
        );
        return Ok(());
    };

    let ctx = AnalyzerContext::new(
        meta,
        store,
        job.sketch_id,
        job.run_id,
        job.analyzer.clone(),
        job.timeline_scope.clone(),
        Arc::clone(&cancel),
        shared.page_size,
    );

    let outcome = analyzer.run(&ctx);
    let meta = ctx.into_meta();

    if cancel.load(Ordering::SeqCst) {
        // `cancel()` normally finalizes the row itself; this covers the
        // window where the flag landed between its check and ours.
        match runs::mark_error(&meta, job.run_id, CANCELLED_DETAIL, now_us()) {
            Ok(_) | Err(StrataError::RunFinished { .. }) => {}
            Err(err) => return Err(err),
        }
        return Ok(());
    }

    match outcome {
        Ok(findings) => {
            match runs::mark_done(&meta, job.run_id, &findings.summary, findings.count, now_us())
            {
                Ok(_) | Err(StrataError::RunFinished { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Err(err) => finalize_error(&meta, job.run_id, &err.to_string()),
    }
    Ok(())
}

fn finalize_error(meta: &rusqlite::Connection, run_id: i64, detail: &str) {
    match runs::mark_error(meta, run_id, detail, now_us()) {
        Ok(_) | Err(StrataError::RunFinished { .. }) => {}
        Err(err) => error!(run_id, %err, "failed to record run error"),
    }
}
