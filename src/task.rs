use crate::engine::ProgressSequence;
use crate::error::{CalwaveError, CalwaveResult};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Named ownership container for background computations
///
/// The pipeline operations run on `Main`; network analysis and wave detection
/// have their own slots so their result views can be shut down independently.
/// Whether two slots may run concurrently is decided by the orchestrator, not
/// here; see `controller.rs` for the global busy-lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotName {
    Main,
    Analysis,
    Waves,
}

impl SlotName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::Main => "main",
            SlotName::Analysis => "analysis",
            SlotName::Waves => "waves",
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Token states. The token is inactive between runs, armed while a unit of
// work owns it, and stop-requested once a cancellation lands on an armed
// token.
const TOKEN_INACTIVE: u8 = 0;
const TOKEN_ARMED: u8 = 1;
const TOKEN_STOP_REQUESTED: u8 = 2;

/// Cooperative cancellation flag
///
/// The owning slot arms the token when a unit of work starts. Anyone holding
/// a reference may request a stop; the running unit of work observes the flag
/// at its own checkpoints. Requesting a stop is idempotent and a no-op while
/// the token is inactive.
#[derive(Debug)]
pub struct CancelToken {
    state: AtomicU8,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TOKEN_INACTIVE),
        }
    }

    /// Arm the token for a new run, clearing any previous stop request
    pub fn arm(&self) {
        self.state.store(TOKEN_ARMED, Ordering::Release);
    }

    /// Return the token to its inactive state
    pub fn disarm(&self) {
        self.state.store(TOKEN_INACTIVE, Ordering::Release);
    }

    /// Request that the running unit of work stop at its next checkpoint
    ///
    /// Does not block and does not guarantee immediate termination. No-op if
    /// no unit of work currently owns the token.
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            TOKEN_ARMED,
            TOKEN_STOP_REQUESTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) == TOKEN_STOP_REQUESTED
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest-value progress channel
///
/// The worker writes a fraction at every checkpoint; the supervisor reads at
/// its own cadence and only ever sees the most recent value. There is no
/// backpressure; values may be overwritten before being read. Within one run
/// the stored value never decreases; `reset` starts the next run at 0.
///
/// Stored as the bit pattern of an `f32`: for non-negative floats the IEEE
/// bit patterns are monotonically ordered, so `fetch_max` on the raw bits
/// enforces monotonicity without a lock.
#[derive(Debug)]
pub struct ProgressChannel {
    bits: AtomicU32,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    /// Restart progress at 0 for a new run
    pub fn reset(&self) {
        self.bits.store(0f32.to_bits(), Ordering::Release);
    }

    /// Report a checkpoint fraction, clamped to [0, 1]
    pub fn report(&self, fraction: f32) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.bits.fetch_max(clamped.to_bits(), Ordering::AcqRel);
    }

    /// The most recent fraction in [0, 1]
    pub fn fraction(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal state of one unit of work
///
/// `Cancelled` is a normal early-termination outcome, not an error; the
/// orchestrator skips the stage commit and any continuation for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Cancelled => "cancelled",
            TaskOutcome::Failed(_) => "failed",
        }
    }
}

/// Owner of at most one running background unit of work
///
/// A slot is created idle. `start` attaches a unit of work and runs it on a
/// dedicated worker thread; the slot owns the cancellation token and progress
/// channel for the lifetime of that run. The interactive thread only ever
/// calls the non-blocking queries (`is_alive`, `poll_outcome`, `progress`)
/// plus `request_stop`; the one bounded wait lives in `shutdown`, used on the
/// view-close path.
pub struct TaskSlot {
    name: SlotName,
    token: Arc<CancelToken>,
    progress: Arc<ProgressChannel>,
    worker: Option<JoinHandle<()>>,
    done_rx: Option<Receiver<TaskOutcome>>,
    last_outcome: Option<TaskOutcome>,
    // Stop flag snapshot taken when the run is reaped, so the supervisor can
    // still skip commits/continuations after the token is disarmed
    stop_observed: bool,
}

impl TaskSlot {
    pub fn new(name: SlotName) -> Self {
        Self {
            name,
            token: Arc::new(CancelToken::new()),
            progress: Arc::new(ProgressChannel::new()),
            worker: None,
            done_rx: None,
            last_outcome: None,
            stop_observed: false,
        }
    }

    pub fn name(&self) -> SlotName {
        self.name
    }

    /// Launch a unit of work on this slot
    ///
    /// Fails with `AlreadyRunning` if a unit of work is still attached.
    /// Otherwise resets progress to 0, arms the cancellation token, and runs
    /// the sequence on a new worker thread without blocking the caller.
    ///
    /// # Errors
    /// Returns `CalwaveError::AlreadyRunning` if the slot is busy, or
    /// `CalwaveError::WorkerSpawnFailed` if the OS refuses the thread.
    pub fn start(&mut self, work: ProgressSequence) -> CalwaveResult<()> {
        if self.is_alive() {
            return Err(CalwaveError::AlreadyRunning(self.name.to_string()));
        }
        // Reap a finished-but-unobserved previous run before reusing the slot
        let _ = self.poll_outcome();

        self.progress.reset();
        self.token.arm();
        self.last_outcome = None;
        self.stop_observed = false;

        let (done_tx, done_rx) = bounded(1);
        let token = Arc::clone(&self.token);
        let progress = Arc::clone(&self.progress);

        let handle = std::thread::Builder::new()
            .name(format!("calwave-{}", self.name))
            .spawn(move || {
                let outcome = run_unit_of_work(work, &token, &progress);
                let _ = done_tx.send(outcome);
            })
            .map_err(|e| CalwaveError::WorkerSpawnFailed(e.to_string()))?;

        self.worker = Some(handle);
        self.done_rx = Some(done_rx);
        Ok(())
    }

    /// Non-blocking liveness check
    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Reap the terminal outcome of the attached unit of work, if any
    ///
    /// Non-blocking. Returns `None` while the unit of work is still running
    /// or when nothing is attached. A worker that died without reporting
    /// (a panic inside the collaborator sequence) is reaped as `Failed`.
    pub fn poll_outcome(&mut self) -> Option<TaskOutcome> {
        let rx = self.done_rx.as_ref()?;
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => {
                if self.is_alive() {
                    return None;
                }
                TaskOutcome::Failed("computation thread terminated unexpectedly".to_string())
            }
            Err(TryRecvError::Disconnected) => {
                TaskOutcome::Failed("computation thread terminated unexpectedly".to_string())
            }
        };
        self.reap();
        self.last_outcome = Some(outcome.clone());
        Some(outcome)
    }

    /// Outcome of the most recently reaped run
    pub fn last_outcome(&self) -> Option<&TaskOutcome> {
        self.last_outcome.as_ref()
    }

    /// Ask the running unit of work to stop at its next checkpoint
    ///
    /// Idempotent; a no-op while the slot is idle.
    pub fn request_stop(&self) {
        self.token.request_stop();
    }

    /// Whether a stop was requested for the current (or just-finished) run
    ///
    /// Stays `true` after the run is reaped until the next `start`, so the
    /// supervisor can decide post-completion whether to skip the stage commit
    /// and any chained continuation.
    pub fn is_stop_requested(&self) -> bool {
        self.token.is_stop_requested() || self.stop_observed
    }

    /// Latest reported progress fraction in [0, 1]
    pub fn progress(&self) -> f32 {
        self.progress.fraction()
    }

    /// Stop the slot and wait (bounded) until it is idle
    ///
    /// Used when a view owning this slot closes: request a stop, then wait up
    /// to `timeout` for the worker to observe it. Returns `true` once the
    /// slot is idle. Never performs an unbounded join.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        if !self.is_alive() {
            let _ = self.poll_outcome();
            return true;
        }
        self.request_stop();

        let received = self
            .done_rx
            .as_ref()
            .and_then(|rx| rx.recv_timeout(timeout).ok());
        match received {
            Some(outcome) => {
                self.reap();
                self.last_outcome = Some(outcome);
                true
            }
            None => !self.is_alive(),
        }
    }

    /// Drop the worker handle and completion channel after the outcome has
    /// been taken. The join is immediate: the worker sends its outcome as its
    /// final action.
    fn reap(&mut self) {
        self.done_rx = None;
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.stop_observed = self.token.is_stop_requested();
        self.token.disarm();
    }
}

/// Drive one unit of work to a terminal state
///
/// Checkpoint contract: each yielded fraction is published to the progress
/// channel first, then the stop flag is checked. On a stop the sequence is
/// dropped without being consumed further; abandonment must leave the
/// collaborator's previously cached state intact.
fn run_unit_of_work(
    mut work: ProgressSequence,
    token: &CancelToken,
    progress: &ProgressChannel,
) -> TaskOutcome {
    for step in &mut work {
        match step {
            Ok(fraction) => {
                progress.report(fraction);
                if token.is_stop_requested() {
                    return TaskOutcome::Cancelled;
                }
            }
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        }
    }
    TaskOutcome::Completed
}
