use crate::engine::DataEngine;
use crate::engine_log;
use crate::error::{CalwaveError, CalwaveResult};
use crate::events::{EventEmitter, ShellSink};
use crate::logger::LogLevel;
use crate::settings::SettingNode;
use crate::stage::{Operation, Stage};
use crate::stage_machine::{StageMachine, TransitionPlan};
use crate::task::{SlotName, TaskOutcome, TaskSlot};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cadence at which the shell should call [`Controller::poll`] while a
/// computation is in flight
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bound on the wait performed when a view closes over a running slot
pub const VIEW_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor state, advanced only on the interactive thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// No computation in flight
    Idle,
    /// A unit of work was launched; the first poll tick has not fired yet
    Busy,
    /// Poll ticks are observing the running unit of work
    Polling,
}

/// How a shell command was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A background unit of work was started
    Launched,
    /// A valid cached result was shown instead; nothing was started
    ReusedCached,
    /// The command arrived while a computation was in flight and was dropped
    Ignored,
}

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Nothing is running
    Idle,
    /// The unit of work is still alive; `fraction` is its latest progress
    Running { slot: SlotName, fraction: f32 },
    /// The unit of work reached a terminal state this tick
    Finished { slot: SlotName, outcome: TaskOutcome },
}

/// What happens after a unit of work completes without cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    OpenAnalysisView,
    OpenWavesView,
    /// Immediately launch the next operation on the same slot
    Chain(Operation),
}

fn continuation_for(operation: Operation) -> Option<Continuation> {
    match operation {
        Operation::NetworkAnalysis => Some(Continuation::OpenAnalysisView),
        Operation::DetectWaves => Some(Continuation::Chain(Operation::CharacterizeWaves)),
        Operation::CharacterizeWaves => Some(Continuation::OpenWavesView),
        _ => None,
    }
}

/// The run currently occupying the busy-lock
#[derive(Debug, Clone, Copy)]
struct ActiveRun {
    run_id: Uuid,
    operation: Operation,
    slot: SlotName,
}

struct SlotSet {
    main: TaskSlot,
    analysis: TaskSlot,
    waves: TaskSlot,
}

impl SlotSet {
    fn new() -> Self {
        Self {
            main: TaskSlot::new(SlotName::Main),
            analysis: TaskSlot::new(SlotName::Analysis),
            waves: TaskSlot::new(SlotName::Waves),
        }
    }

    fn get(&self, name: SlotName) -> &TaskSlot {
        match name {
            SlotName::Main => &self.main,
            SlotName::Analysis => &self.analysis,
            SlotName::Waves => &self.waves,
        }
    }

    fn get_mut(&mut self, name: SlotName) -> &mut TaskSlot {
        match name {
            SlotName::Main => &mut self.main,
            SlotName::Analysis => &mut self.analysis,
            SlotName::Waves => &mut self.waves,
        }
    }
}

/// Orchestrator for the analysis pipeline
///
/// Owns the stage machine and the task slots, and is the only place that
/// starts computations, commits stage transitions, or talks to the shell.
/// Lives on the interactive thread: commands come in from menu/button
/// handlers, and the shell arms a repeating [`POLL_INTERVAL`] timer that
/// calls [`poll`](Self::poll) while anything is running. No method here
/// blocks beyond the bounded wait in [`close_view`](Self::close_view).
///
/// The three slots share one busy-lock: every operation mutates overlapping
/// parts of the shared dataset, so at most one unit of work runs system-wide
/// and commands arriving in the meantime are dropped, not queued.
pub struct Controller {
    engine: Arc<dyn DataEngine>,
    sink: Arc<dyn ShellSink>,
    stages: StageMachine,
    slots: SlotSet,
    phase: SupervisorPhase,
    active: Option<ActiveRun>,
}

impl Controller {
    pub fn new(engine: Arc<dyn DataEngine>, sink: Arc<dyn ShellSink>) -> Self {
        Self {
            engine,
            sink,
            stages: StageMachine::new(),
            slots: SlotSet::new(),
            phase: SupervisorPhase::Idle,
            active: None,
        }
    }

    /// The currently committed pipeline stage
    pub fn current_stage(&self) -> Stage {
        self.stages.current()
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Whether `slot` holds the in-flight unit of work
    ///
    /// Remains `true` until the terminal poll tick has processed the run,
    /// not merely until the worker thread exits.
    pub fn is_busy(&self, slot: SlotName) -> bool {
        self.active.as_ref().is_some_and(|run| run.slot == slot)
    }

    /// Whether any slot is busy (the global busy-lock)
    pub fn is_any_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Latest progress fraction reported on `slot`
    pub fn progress(&self, slot: SlotName) -> f32 {
        self.slots.get(slot).progress()
    }

    /// Dispatch a requested pipeline operation
    ///
    /// Guard checks run in order: a command arriving while any computation is
    /// in flight is dropped (`Dispatch::Ignored`); a command issued before a
    /// dataset exists, or before the operation's required stage, is rejected.
    /// Otherwise the stage machine decides between re-entering a valid cached
    /// result and launching a new background unit of work.
    ///
    /// # Errors
    /// `CalwaveError::PreconditionNotMet` when the stage requirement fails;
    /// `CalwaveError::DomainValidation` when the collaborator rejects its
    /// inputs up front (also surfaced to the shell as a `task:error` event).
    pub fn request_transition(&mut self, operation: Operation) -> CalwaveResult<Dispatch> {
        if self.active.is_some() {
            engine_log!(
                LogLevel::Debug,
                "Dropping '{}' request: a computation is in flight",
                operation
            );
            return Ok(Dispatch::Ignored);
        }

        let current = self.stages.current();
        if current == Stage::Empty {
            return Err(CalwaveError::PreconditionNotMet(
                "no dataset has been imported".to_string(),
            ));
        }
        let required = operation.required_stage();
        if current < required {
            return Err(CalwaveError::PreconditionNotMet(format!(
                "'{operation}' requires stage '{required}', current stage is '{current}'"
            )));
        }

        let cache_present = operation
            .output_stage()
            .is_some_and(|stage| self.engine.has_cached_result(stage));

        match self.stages.plan(operation, cache_present) {
            TransitionPlan::ReuseCached => {
                if let Some(output) = operation.output_stage() {
                    let previous = self.stages.current();
                    self.stages.revisit(output)?;
                    if previous != output {
                        let _ = EventEmitter::stage_changed(
                            self.sink.as_ref(),
                            previous.as_str(),
                            output.as_str(),
                        );
                    }
                    let _ = EventEmitter::redraw_requested(self.sink.as_ref(), output.as_str());
                }
                engine_log!(LogLevel::Info, "Reusing cached result for '{}'", operation);
                Ok(Dispatch::ReusedCached)
            }
            TransitionPlan::Launch => {
                self.launch(operation)?;
                Ok(Dispatch::Launched)
            }
        }
    }

    /// One supervisor tick; never blocks
    ///
    /// While the unit of work is alive this refreshes the progress display
    /// and reports `Running`. On the tick that observes termination it
    /// restores the cursor and publishes the final progress value. Only an
    /// un-stopped completion commits the stage transition and runs the
    /// operation's continuation.
    pub fn poll(&mut self) -> PollStatus {
        let Some(run) = self.active else {
            self.phase = SupervisorPhase::Idle;
            return PollStatus::Idle;
        };
        self.phase = SupervisorPhase::Polling;

        let slot = self.slots.get_mut(run.slot);
        if slot.is_alive() {
            let fraction = slot.progress();
            let _ = EventEmitter::task_progress(
                self.sink.as_ref(),
                run.run_id,
                run.slot.as_str(),
                fraction,
            );
            return PollStatus::Running {
                slot: run.slot,
                fraction,
            };
        }

        let Some(outcome) = slot.poll_outcome() else {
            // The run was reaped elsewhere (view close); nothing to supervise
            self.active = None;
            self.phase = SupervisorPhase::Idle;
            return PollStatus::Idle;
        };
        let stopped = slot.is_stop_requested();
        let final_fraction = slot.progress();

        let _ = EventEmitter::busy_cursor(self.sink.as_ref(), false);
        let _ = EventEmitter::task_progress(
            self.sink.as_ref(),
            run.run_id,
            run.slot.as_str(),
            final_fraction,
        );
        self.active = None;
        self.phase = SupervisorPhase::Idle;

        // A stop that landed after the final checkpoint still cancels the
        // run: the commit and continuation are skipped either way.
        let outcome = if stopped && outcome == TaskOutcome::Completed {
            TaskOutcome::Cancelled
        } else {
            outcome
        };

        match &outcome {
            TaskOutcome::Completed => {
                if let Some(output) = run.operation.output_stage() {
                    let previous = self.stages.current();
                    self.stages.commit(output);
                    if previous != output {
                        let _ = EventEmitter::stage_changed(
                            self.sink.as_ref(),
                            previous.as_str(),
                            output.as_str(),
                        );
                    }
                }
                let _ = EventEmitter::task_finished(
                    self.sink.as_ref(),
                    run.run_id,
                    run.slot.as_str(),
                    run.operation.as_str(),
                    outcome.as_str(),
                );
                engine_log!(LogLevel::Info, "'{}' completed", run.operation);
                self.run_continuation(run.operation);
            }
            TaskOutcome::Cancelled => {
                let _ = EventEmitter::task_finished(
                    self.sink.as_ref(),
                    run.run_id,
                    run.slot.as_str(),
                    run.operation.as_str(),
                    outcome.as_str(),
                );
                engine_log!(LogLevel::Info, "'{}' cancelled", run.operation);
            }
            TaskOutcome::Failed(message) => {
                let _ = EventEmitter::task_error(self.sink.as_ref(), Some(run.run_id), message);
                let _ = EventEmitter::task_finished(
                    self.sink.as_ref(),
                    run.run_id,
                    run.slot.as_str(),
                    run.operation.as_str(),
                    outcome.as_str(),
                );
                engine_log!(LogLevel::Error, "'{}' failed: {}", run.operation, message);
            }
        }

        PollStatus::Finished {
            slot: run.slot,
            outcome,
        }
    }

    /// Request cancellation of the unit of work on `slot`
    ///
    /// Cooperative: takes effect at the next checkpoint. Idempotent, and a
    /// no-op while the slot is idle.
    pub fn cancel(&mut self, slot: SlotName) {
        self.slots.get(slot).request_stop();
    }

    /// The shell finished importing a new raw dataset into the collaborator
    ///
    /// Every computed result is now stale: collaborator caches are dropped,
    /// validity is cleared, and the stage returns to `Imported`.
    ///
    /// # Errors
    /// `CalwaveError::AlreadyRunning` while a computation is in flight;
    /// shells should check [`is_any_busy`](Self::is_any_busy) first.
    pub fn mark_imported(&mut self) -> CalwaveResult<()> {
        self.ensure_idle()?;
        self.engine.discard_results_from(Stage::Filtered);
        let previous = self.stages.current();
        self.stages.reset_to_imported();
        if previous != Stage::Imported {
            let _ = EventEmitter::stage_changed(
                self.sink.as_ref(),
                previous.as_str(),
                Stage::Imported.as_str(),
            );
        }
        let _ = EventEmitter::redraw_requested(self.sink.as_ref(), Stage::Imported.as_str());
        engine_log!(LogLevel::Info, "Dataset imported; computations reset");
        Ok(())
    }

    /// Clear the session: no dataset loaded
    ///
    /// # Errors
    /// `CalwaveError::AlreadyRunning` while a computation is in flight.
    pub fn reset(&mut self) -> CalwaveResult<()> {
        self.ensure_idle()?;
        self.engine.discard_results_from(Stage::Filtered);
        let previous = self.stages.current();
        self.stages.clear();
        if previous != Stage::Empty {
            let _ = EventEmitter::stage_changed(
                self.sink.as_ref(),
                previous.as_str(),
                Stage::Empty.as_str(),
            );
        }
        Ok(())
    }

    /// Validate and adopt a new settings tree
    ///
    /// On success everything downstream of the raw import is invalidated and
    /// the stage falls back to `Imported`; the next request for any cleared
    /// stage launches a fresh computation. On rejection the previous
    /// settings, caches, and stage all stay in effect.
    ///
    /// # Errors
    /// `CalwaveError::AlreadyRunning` while busy, `PreconditionNotMet` with
    /// no dataset, `DomainValidation` when the collaborator rejects the tree
    /// (also surfaced as a `task:error` event).
    pub fn apply_settings(&mut self, settings: &SettingNode) -> CalwaveResult<()> {
        self.ensure_idle()?;
        if self.stages.current() == Stage::Empty {
            return Err(CalwaveError::PreconditionNotMet(
                "no dataset has been imported".to_string(),
            ));
        }
        if let Err(e) = self.engine.apply_settings(settings) {
            let _ = EventEmitter::task_error(self.sink.as_ref(), None, &e.to_string());
            return Err(e);
        }
        self.engine.discard_results_from(Stage::Filtered);
        let previous = self.stages.current();
        self.stages.reset_to_imported();
        if previous != Stage::Imported {
            let _ = EventEmitter::stage_changed(
                self.sink.as_ref(),
                previous.as_str(),
                Stage::Imported.as_str(),
            );
        }
        let _ = EventEmitter::redraw_requested(self.sink.as_ref(), Stage::Imported.as_str());
        engine_log!(LogLevel::Info, "Settings applied; downstream results invalidated");
        Ok(())
    }

    /// A view owning `slot` is closing: stop its work and wait, bounded,
    /// for the slot to go idle
    ///
    /// Returns `true` once the slot is idle. Runs terminated here are never
    /// committed, whatever their outcome.
    pub fn close_view(&mut self, slot: SlotName) -> bool {
        let was_active = self.is_busy(slot);
        let idle = self.slots.get_mut(slot).shutdown(VIEW_CLOSE_TIMEOUT);
        if idle && was_active {
            if let Some(run) = self.active.take() {
                let _ = EventEmitter::busy_cursor(self.sink.as_ref(), false);
                let outcome = self
                    .slots
                    .get(slot)
                    .last_outcome()
                    .map_or("cancelled", TaskOutcome::as_str);
                let _ = EventEmitter::task_finished(
                    self.sink.as_ref(),
                    run.run_id,
                    slot.as_str(),
                    run.operation.as_str(),
                    outcome,
                );
                self.phase = SupervisorPhase::Idle;
            }
        }
        idle
    }

    fn ensure_idle(&self) -> CalwaveResult<()> {
        match &self.active {
            Some(run) => Err(CalwaveError::AlreadyRunning(run.slot.to_string())),
            None => Ok(()),
        }
    }

    fn launch(&mut self, operation: Operation) -> CalwaveResult<()> {
        let sequence = match self.engine.begin(operation) {
            Ok(sequence) => sequence,
            Err(e) => {
                let _ = EventEmitter::task_error(self.sink.as_ref(), None, &e.to_string());
                return Err(e);
            }
        };

        let slot_name = operation.slot();
        let run_id = Uuid::new_v4();
        self.slots.get_mut(slot_name).start(sequence)?;

        let _ = EventEmitter::busy_cursor(self.sink.as_ref(), true);
        let _ = EventEmitter::task_started(
            self.sink.as_ref(),
            run_id,
            slot_name.as_str(),
            operation.as_str(),
        );
        engine_log!(LogLevel::Info, "Started '{}' on slot '{}'", operation, slot_name);

        self.active = Some(ActiveRun {
            run_id,
            operation,
            slot: slot_name,
        });
        self.phase = SupervisorPhase::Busy;
        Ok(())
    }

    fn run_continuation(&mut self, operation: Operation) {
        let stage = self.stages.current();
        match continuation_for(operation) {
            None => {
                let _ = EventEmitter::redraw_requested(self.sink.as_ref(), stage.as_str());
            }
            Some(Continuation::OpenAnalysisView) => {
                let _ = EventEmitter::redraw_requested(self.sink.as_ref(), stage.as_str());
                let _ = EventEmitter::view_open(self.sink.as_ref(), "analysis");
            }
            Some(Continuation::OpenWavesView) => {
                let _ = EventEmitter::redraw_requested(self.sink.as_ref(), stage.as_str());
                let _ = EventEmitter::view_open(self.sink.as_ref(), "waves");
            }
            Some(Continuation::Chain(next)) => {
                // A stop requested between the terminal checkpoint and this
                // tick must not leak into the next stage of the chain.
                if self.slots.get(next.slot()).is_stop_requested() {
                    engine_log!(
                        LogLevel::Info,
                        "Skipping chained '{}' after stop request",
                        next
                    );
                    return;
                }
                if let Err(e) = self.launch(next) {
                    engine_log!(LogLevel::Error, "Chained '{}' failed to start: {}", next, e);
                }
            }
        }
    }
}
