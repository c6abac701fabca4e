use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event names - centralized for consistency
pub mod event_names {
    pub const TASK_STARTED: &str = "task:started";
    pub const TASK_PROGRESS: &str = "task:progress";
    pub const TASK_FINISHED: &str = "task:finished";
    pub const TASK_ERROR: &str = "task:error";
    pub const STAGE_CHANGED: &str = "stage:changed";
    pub const VIEW_REDRAW: &str = "view:redraw";
    pub const VIEW_BUSY_CURSOR: &str = "view:busy-cursor";
    pub const VIEW_OPEN: &str = "view:open";
}

/// Sink for events addressed to the shell/view layer
///
/// The engine never constructs widgets or draws plots; everything the shell
/// needs to reflect (progress, stage changes, busy cursor, error dialogs) is
/// delivered through this trait. Implementations must not block: emitting
/// happens on the interactive thread inside the supervisor's poll tick.
pub trait ShellSink: Send + Sync {
    /// Deliver one event. Errors are reported back so the emitter can log
    /// them, but the engine never acts on a failed emit.
    fn emit(&self, event: &str, payload: Value) -> Result<(), String>;
}

/// Sink that discards every event. Useful for headless runs and tests.
pub struct NullSink;

impl ShellSink for NullSink {
    fn emit(&self, _event: &str, _payload: Value) -> Result<(), String> {
        Ok(())
    }
}

/// Background task started event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartedEvent {
    pub run_id: Uuid,
    pub slot: String,
    pub operation: String,
    pub timestamp: String,
}

/// Background task progress event (emitted on every poll tick while running)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressEvent {
    pub run_id: Uuid,
    pub slot: String,
    pub fraction: f32,
    pub timestamp: String,
}

/// Background task reached a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFinishedEvent {
    pub run_id: Uuid,
    pub slot: String,
    pub operation: String,
    pub outcome: String, // "completed", "cancelled", "failed"
    pub timestamp: String,
}

/// A unit of work raised a domain error; the shell shows an error dialog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskErrorEvent {
    pub run_id: Option<Uuid>,
    pub error: String,
    pub timestamp: String,
}

/// Committed pipeline stage changed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChangedEvent {
    pub previous: String,
    pub current: String,
    pub timestamp: String,
}

/// The shell should redraw its main canvas for the given stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedrawRequestedEvent {
    pub stage: String,
    pub timestamp: String,
}

/// Busy cursor on/off
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyCursorEvent {
    pub active: bool,
    pub timestamp: String,
}

/// The shell should open a result view ("analysis" or "waves")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOpenEvent {
    pub view: String,
    pub timestamp: String,
}

/// Centralized event emitter
pub struct EventEmitter;

impl EventEmitter {
    fn emit<T: Serialize>(sink: &dyn ShellSink, name: &str, event: T) -> Result<(), String> {
        let payload = serde_json::to_value(event)
            .map_err(|e| format!("Failed to serialize {} event: {}", name, e))?;
        sink.emit(name, payload)
    }

    /// Emit task started event
    pub fn task_started(
        sink: &dyn ShellSink,
        run_id: Uuid,
        slot: &str,
        operation: &str,
    ) -> Result<(), String> {
        let event = TaskStartedEvent {
            run_id,
            slot: slot.to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::TASK_STARTED, event)
    }

    /// Emit task progress event
    pub fn task_progress(
        sink: &dyn ShellSink,
        run_id: Uuid,
        slot: &str,
        fraction: f32,
    ) -> Result<(), String> {
        let event = TaskProgressEvent {
            run_id,
            slot: slot.to_string(),
            fraction,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::TASK_PROGRESS, event)
    }

    /// Emit task finished event
    pub fn task_finished(
        sink: &dyn ShellSink,
        run_id: Uuid,
        slot: &str,
        operation: &str,
        outcome: &str,
    ) -> Result<(), String> {
        let event = TaskFinishedEvent {
            run_id,
            slot: slot.to_string(),
            operation: operation.to_string(),
            outcome: outcome.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::TASK_FINISHED, event)
    }

    /// Emit task error event
    pub fn task_error(
        sink: &dyn ShellSink,
        run_id: Option<Uuid>,
        error: &str,
    ) -> Result<(), String> {
        let event = TaskErrorEvent {
            run_id,
            error: error.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::TASK_ERROR, event)
    }

    /// Emit stage changed event
    pub fn stage_changed(
        sink: &dyn ShellSink,
        previous: &str,
        current: &str,
    ) -> Result<(), String> {
        let event = StageChangedEvent {
            previous: previous.to_string(),
            current: current.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::STAGE_CHANGED, event)
    }

    /// Emit redraw requested event
    pub fn redraw_requested(sink: &dyn ShellSink, stage: &str) -> Result<(), String> {
        let event = RedrawRequestedEvent {
            stage: stage.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::VIEW_REDRAW, event)
    }

    /// Emit busy cursor event
    pub fn busy_cursor(sink: &dyn ShellSink, active: bool) -> Result<(), String> {
        let event = BusyCursorEvent {
            active,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::VIEW_BUSY_CURSOR, event)
    }

    /// Emit view open event
    pub fn view_open(sink: &dyn ShellSink, view: &str) -> Result<(), String> {
        let event = ViewOpenEvent {
            view: view.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        Self::emit(sink, event_names::VIEW_OPEN, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingSink {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl ShellSink for CollectingSink {
        fn emit(&self, event: &str, payload: Value) -> Result<(), String> {
            self.events
                .lock()
                .map_err(|e| e.to_string())?
                .push((event.to_string(), payload));
            Ok(())
        }
    }

    #[test]
    fn test_task_started_payload_shape() {
        let sink = CollectingSink::new();
        let run_id = Uuid::new_v4();

        EventEmitter::task_started(&sink, run_id, "main", "filter").unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let (name, payload) = &events[0];
        assert_eq!(name, event_names::TASK_STARTED);
        assert_eq!(payload["slot"], "main");
        assert_eq!(payload["operation"], "filter");
        assert_eq!(payload["runId"], run_id.to_string());
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_progress_fraction_serializes_as_number() {
        let sink = CollectingSink::new();

        EventEmitter::task_progress(&sink, Uuid::new_v4(), "waves", 0.25).unwrap();

        let events = sink.events.lock().unwrap();
        let (_, payload) = &events[0];
        assert!((payload["fraction"].as_f64().unwrap() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_task_error_without_run_id() {
        let sink = CollectingSink::new();

        EventEmitter::task_error(&sink, None, "Dataset is empty").unwrap();

        let events = sink.events.lock().unwrap();
        let (name, payload) = &events[0];
        assert_eq!(name, event_names::TASK_ERROR);
        assert!(payload["runId"].is_null());
        assert_eq!(payload["error"], "Dataset is empty");
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        assert!(EventEmitter::busy_cursor(&NullSink, true).is_ok());
        assert!(EventEmitter::view_open(&NullSink, "analysis").is_ok());
    }
}
