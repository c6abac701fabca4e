//! Backend engine for an interactive calcium-signal analysis tool.
//!
//! The shell (widgets, plotting, file I/O) and the numeric collaborator
//! (filtering, distribution estimation, binarization, network and wave
//! analysis) both live outside this crate. What lives here is the machinery
//! between them: the [`controller::Controller`] tracks which pipeline stage
//! the working dataset is in, launches at most one cooperative background
//! computation at a time on a named [`task::TaskSlot`], exposes fractional
//! progress to the shell's poll timer, and supports cooperative cancellation
//! without ever blocking the interactive thread.

pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod logger;
pub mod settings;
pub mod stage;
pub mod stage_machine;
pub mod task;

pub use controller::{Controller, Dispatch, PollStatus, SupervisorPhase, POLL_INTERVAL};
pub use engine::{DataEngine, ProgressSequence};
pub use error::{CalwaveError, CalwaveResult};
pub use events::{EventEmitter, NullSink, ShellSink};
pub use settings::{SettingNode, SettingsVisitor};
pub use stage::{Operation, Stage};
pub use stage_machine::{StageMachine, TransitionPlan};
pub use task::{CancelToken, ProgressChannel, SlotName, TaskOutcome, TaskSlot};
