use crate::error::{CalwaveError, CalwaveResult};
use crate::stage::{Operation, Stage};
use std::collections::HashSet;

/// Decision for one requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// A valid cached result exists; re-enter its stage without computing
    ReuseCached,
    /// A new background unit of work must be launched
    Launch,
}

/// Owner of the pipeline's committed stage and per-stage cache validity
///
/// The collaborator owns the cached artifacts themselves; this machine only
/// tracks which of them are still VALID for the current inputs. A stage's
/// cache is marked valid by `commit` and swept by `invalidate_from`, so a
/// result computed before a settings change can never be reused afterwards
/// even if the collaborator still holds it.
///
/// All methods assume the orchestrator has already rejected commands that
/// arrive while the dataset is `Empty` or below an operation's required
/// stage; mutation happens only on the interactive thread.
#[derive(Debug)]
pub struct StageMachine {
    current: Stage,
    valid: HashSet<Stage>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::Empty,
            valid: HashSet::new(),
        }
    }

    /// The currently committed stage
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Whether `stage` has a committed, not-yet-invalidated result
    pub fn is_valid(&self, stage: Stage) -> bool {
        self.valid.contains(&stage)
    }

    /// Decide whether `operation` can reuse its cached output
    ///
    /// `cache_present` is the collaborator's answer for the operation's
    /// output stage. Reuse requires the operation to be one whose output is
    /// reusable at all, the current stage to satisfy its precondition, the
    /// cached artifact to be present, and its validity to have survived
    /// every invalidation since it was committed. Anything else launches;
    /// the in-place refinements and the analyses launch unconditionally.
    pub fn plan(&self, operation: Operation, cache_present: bool) -> TransitionPlan {
        let Some(output) = operation.output_stage() else {
            return TransitionPlan::Launch;
        };
        if operation.reuses_cached_output()
            && cache_present
            && self.valid.contains(&output)
            && self.current >= operation.required_stage()
        {
            TransitionPlan::ReuseCached
        } else {
            TransitionPlan::Launch
        }
    }

    /// Commit the stage produced by a completed, uncancelled unit of work
    ///
    /// Recomputing a stage means its inputs changed, so validity of every
    /// stage after it is dropped at the same time.
    pub fn commit(&mut self, stage: Stage) {
        self.valid.retain(|s| *s <= stage);
        self.valid.insert(stage);
        self.current = stage;
    }

    /// Re-enter an already-valid stage without recomputation
    ///
    /// # Errors
    /// Returns `CalwaveError::InvalidStageTransition` if `stage` has no valid
    /// committed result to show.
    pub fn revisit(&mut self, stage: Stage) -> CalwaveResult<()> {
        if !self.valid.contains(&stage) {
            return Err(CalwaveError::InvalidStageTransition(format!(
                "Cannot revisit '{stage}': no valid cached result"
            )));
        }
        self.current = stage;
        Ok(())
    }

    /// Invalidate every cached result at or after `stage`
    ///
    /// Forces `Launch` on the next request for any of the cleared stages.
    /// The committed stage itself is left untouched; callers that change
    /// upstream inputs pair this with a stage reset.
    pub fn invalidate_from(&mut self, stage: Stage) {
        self.valid.retain(|s| *s < stage);
    }

    /// New raw data (or new settings): drop all validity, back to `Imported`
    pub fn reset_to_imported(&mut self) {
        self.valid.clear();
        self.current = Stage::Imported;
    }

    /// Session cleared: no dataset loaded
    pub fn clear(&mut self) {
        self.valid.clear();
        self.current = Stage::Empty;
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imported_machine() -> StageMachine {
        let mut machine = StageMachine::new();
        machine.reset_to_imported();
        machine
    }

    #[test]
    fn test_new_machine_is_empty() {
        let machine = StageMachine::new();
        assert_eq!(machine.current(), Stage::Empty);
        assert!(!machine.is_valid(Stage::Filtered));
    }

    #[test]
    fn test_plan_launches_without_cache() {
        let machine = imported_machine();
        assert_eq!(
            machine.plan(Operation::Filter, false),
            TransitionPlan::Launch
        );
    }

    #[test]
    fn test_plan_reuses_committed_cache() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);

        assert_eq!(
            machine.plan(Operation::Filter, true),
            TransitionPlan::ReuseCached
        );
    }

    #[test]
    fn test_plan_ignores_present_but_uncommitted_cache() {
        // The collaborator may hold an artifact from a run whose commit was
        // skipped (cancellation after the last checkpoint). It must not be
        // reused.
        let machine = imported_machine();
        assert_eq!(
            machine.plan(Operation::Filter, true),
            TransitionPlan::Launch
        );
    }

    #[test]
    fn test_invalidated_cache_is_never_reused() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);
        machine.commit(Stage::Binarized);

        machine.invalidate_from(Stage::Filtered);

        assert_eq!(
            machine.plan(Operation::Filter, true),
            TransitionPlan::Launch
        );
        assert_eq!(
            machine.plan(Operation::Binarize, true),
            TransitionPlan::Launch
        );
    }

    #[test]
    fn test_invalidate_from_keeps_earlier_stages() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);
        machine.commit(Stage::Binarized);

        machine.invalidate_from(Stage::Binarized);

        assert!(machine.is_valid(Stage::Filtered));
        assert!(!machine.is_valid(Stage::Binarized));
    }

    #[test]
    fn test_commit_drops_downstream_validity() {
        let mut machine = imported_machine();
        machine.commit(Stage::Binarized);
        machine.commit(Stage::Analyzed);

        // Re-binarizing (e.g. after a crop) invalidates the analysis built
        // on the previous binarization.
        machine.commit(Stage::Binarized);

        assert!(!machine.is_valid(Stage::Analyzed));
        assert!(machine.is_valid(Stage::Binarized));
        assert_eq!(machine.current(), Stage::Binarized);
    }

    #[test]
    fn test_revisit_valid_stage_moves_current() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);
        machine.commit(Stage::Binarized);

        machine.revisit(Stage::Filtered).unwrap();
        assert_eq!(machine.current(), Stage::Filtered);
        // Revisiting shows an old stage; it does not invalidate anything
        assert!(machine.is_valid(Stage::Binarized));
    }

    #[test]
    fn test_revisit_invalid_stage_fails() {
        let mut machine = imported_machine();
        let result = machine.revisit(Stage::Filtered);
        assert!(matches!(
            result,
            Err(CalwaveError::InvalidStageTransition(_))
        ));
        assert_eq!(machine.current(), Stage::Imported);
    }

    #[test]
    fn test_reset_to_imported_clears_validity() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);

        machine.reset_to_imported();

        assert_eq!(machine.current(), Stage::Imported);
        assert!(!machine.is_valid(Stage::Filtered));
    }

    #[test]
    fn test_auto_exclude_always_launches() {
        let mut machine = imported_machine();
        machine.commit(Stage::Filtered);
        assert_eq!(
            machine.plan(Operation::AutoExclude, true),
            TransitionPlan::Launch
        );
    }

    #[test]
    fn test_in_place_and_analysis_operations_recompute_despite_valid_cache() {
        let mut machine = imported_machine();
        machine.commit(Stage::Binarized);

        // A crop request must never be satisfied by the existing binarized
        // series.
        assert_eq!(
            machine.plan(Operation::AutoLimit, true),
            TransitionPlan::Launch
        );

        machine.commit(Stage::WavesDetected);
        assert_eq!(
            machine.plan(Operation::DetectWaves, true),
            TransitionPlan::Launch
        );
    }
}
