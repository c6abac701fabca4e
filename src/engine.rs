use crate::error::CalwaveResult;
use crate::settings::SettingNode;
use crate::stage::{Operation, Stage};

/// One long-running computation, exposed as a lazy sequence of progress
/// fractions in [0, 1]
///
/// Consuming the full sequence performs the operation and leaves its result
/// cached inside the collaborator. The sequence is finite, non-decreasing,
/// and ends at 1.0 on success; it may yield `Err` once (a domain validation
/// failure) and then terminate. Partial consumption followed by abandonment
/// must leave the collaborator's previously cached state intact; no partial
/// commit.
pub type ProgressSequence = Box<dyn Iterator<Item = CalwaveResult<f32>> + Send>;

/// The data/analysis collaborator consumed by the orchestrator
///
/// Implementations own the working dataset (raw series, per-stage cached
/// results, exclusion flags) and all numeric algorithms; the engine core only
/// schedules them. Every method here is called from the interactive thread;
/// the returned [`ProgressSequence`] is handed to a worker thread and
/// consumed there, so implementations must be `Send + Sync` and may only
/// mutate dataset state from inside a sequence while its slot is running.
///
/// # Example
/// ```
/// use calwave::engine::{DataEngine, ProgressSequence};
/// use calwave::error::{CalwaveError, CalwaveResult};
/// use calwave::settings::SettingNode;
/// use calwave::stage::{Operation, Stage};
///
/// struct NoopEngine;
///
/// impl DataEngine for NoopEngine {
///     fn begin(&self, _operation: Operation) -> CalwaveResult<ProgressSequence> {
///         Ok(Box::new([0.5f32, 1.0].into_iter().map(Ok::<f32, CalwaveError>)))
///     }
///
///     fn has_cached_result(&self, _stage: Stage) -> bool {
///         false
///     }
///
///     fn discard_results_from(&self, _stage: Stage) {}
///
///     fn apply_settings(&self, _settings: &SettingNode) -> CalwaveResult<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait DataEngine: Send + Sync {
    /// Begin one operation, returning its restartable progress sequence
    ///
    /// # Errors
    /// Returns `CalwaveError::DomainValidation` when the inputs are invalid
    /// up front (empty dataset, conflicting settings). Validation failures
    /// discovered mid-computation are yielded through the sequence instead.
    fn begin(&self, operation: Operation) -> CalwaveResult<ProgressSequence>;

    /// Whether a previously computed result for `stage` is present
    ///
    /// Presence only: the orchestrator's stage machine separately tracks
    /// whether that result is still valid for the current inputs.
    fn has_cached_result(&self, stage: Stage) -> bool;

    /// Drop every cached result at or after `stage`
    ///
    /// Called when upstream inputs change (new raw data, new settings).
    fn discard_results_from(&self, stage: Stage);

    /// Validate and adopt a new settings tree
    ///
    /// # Errors
    /// Returns `CalwaveError::DomainValidation` with a human-readable message
    /// when the settings are rejected; the previous settings stay in effect.
    fn apply_settings(&self, settings: &SettingNode) -> CalwaveResult<()>;
}
