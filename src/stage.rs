use crate::task::SlotName;
use serde::{Deserialize, Serialize};

/// A committed point in the analysis pipeline
///
/// Stages are ordered: every variant may only be reached once all of its
/// upstream transformations have been committed to the working dataset.
/// `Imported` is reachable directly from `Empty` and, via a reset, from any
/// later stage. Variant order defines the pipeline's partial order, so the
/// derived `Ord` is the source of truth for "at least stage X" checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// No dataset loaded
    Empty,

    /// Raw series imported by the shell
    Imported,

    /// Fast-component filtering applied
    Filtered,

    /// Noise/signal amplitude distributions estimated
    DistributionsComputed,

    /// Series binarized against the estimated distributions
    Binarized,

    /// Network metrics computed
    Analyzed,

    /// Waves detected and characterized
    WavesDetected,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Self; 7] = [
        Self::Empty,
        Self::Imported,
        Self::Filtered,
        Self::DistributionsComputed,
        Self::Binarized,
        Self::Analyzed,
        Self::WavesDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Imported => "imported",
            Self::Filtered => "filtered",
            Self::DistributionsComputed => "distributions",
            Self::Binarized => "binarized",
            Self::Analyzed => "analyzed",
            Self::WavesDetected => "waves",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-running collaborator operations the shell can request
///
/// Each operation is executed by the data/analysis collaborator as a lazy
/// progress sequence (see `crate::engine::DataEngine`). The tables below
/// drive the orchestrator's guard checks: which stage the dataset must have
/// reached before the operation makes sense, which stage a successful run
/// commits, and which slot the run occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Filter,
    ComputeDistributions,
    Binarize,
    AutoExclude,
    AutoLimit,
    NetworkAnalysis,
    DetectWaves,
    CharacterizeWaves,
}

impl Operation {
    /// Minimum committed stage required before this operation may launch
    pub fn required_stage(&self) -> Stage {
        match self {
            // The four dataset-wide transforms only need raw data present,
            // matching the shell's button gating
            Self::Filter | Self::ComputeDistributions | Self::Binarize | Self::AutoExclude => {
                Stage::Imported
            }
            Self::AutoLimit | Self::NetworkAnalysis | Self::DetectWaves => Stage::Binarized,
            Self::CharacterizeWaves => Stage::WavesDetected,
        }
    }

    /// Stage committed when a launched run completes without cancellation
    ///
    /// `None` for operations that refine the dataset in place without
    /// advancing the pipeline (automatic cell exclusion).
    pub fn output_stage(&self) -> Option<Stage> {
        match self {
            Self::Filter => Some(Stage::Filtered),
            Self::ComputeDistributions => Some(Stage::DistributionsComputed),
            Self::Binarize | Self::AutoLimit => Some(Stage::Binarized),
            Self::AutoExclude => None,
            Self::NetworkAnalysis => Some(Stage::Analyzed),
            Self::DetectWaves | Self::CharacterizeWaves => Some(Stage::WavesDetected),
        }
    }

    /// Whether a prior committed run's cached output can stand in for a
    /// new request
    ///
    /// True only for the pipeline transforms whose result is re-displayed
    /// when requested again. The in-place refinements (exclusion, cropping)
    /// and the analyses recompute on every request.
    pub fn reuses_cached_output(&self) -> bool {
        matches!(
            self,
            Self::Filter | Self::ComputeDistributions | Self::Binarize
        )
    }

    /// The slot this operation's unit of work occupies
    pub fn slot(&self) -> SlotName {
        match self {
            Self::NetworkAnalysis => SlotName::Analysis,
            Self::DetectWaves | Self::CharacterizeWaves => SlotName::Waves,
            _ => SlotName::Main,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::ComputeDistributions => "computeDistributions",
            Self::Binarize => "binarize",
            Self::AutoExclude => "autoExclude",
            Self::AutoLimit => "autoLimit",
            Self::NetworkAnalysis => "networkAnalysis",
            Self::DetectWaves => "detectWaves",
            Self::CharacterizeWaves => "characterizeWaves",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_pipeline() {
        assert!(Stage::Empty < Stage::Imported);
        assert!(Stage::Imported < Stage::Filtered);
        assert!(Stage::Filtered < Stage::DistributionsComputed);
        assert!(Stage::DistributionsComputed < Stage::Binarized);
        assert!(Stage::Binarized < Stage::Analyzed);
        assert!(Stage::Analyzed < Stage::WavesDetected);
    }

    #[test]
    fn test_all_contains_every_stage_once() {
        let mut seen = std::collections::HashSet::new();
        for stage in Stage::ALL {
            assert!(seen.insert(stage), "Duplicate stage in ALL: {stage}");
        }
        assert_eq!(Stage::ALL.len(), 7);
    }

    #[test]
    fn test_output_stage_never_below_required() {
        for op in [
            Operation::Filter,
            Operation::ComputeDistributions,
            Operation::Binarize,
            Operation::AutoExclude,
            Operation::AutoLimit,
            Operation::NetworkAnalysis,
            Operation::DetectWaves,
            Operation::CharacterizeWaves,
        ] {
            if let Some(output) = op.output_stage() {
                assert!(
                    output >= op.required_stage(),
                    "{op} would commit a stage below its own precondition"
                );
            }
        }
    }

    #[test]
    fn test_only_pipeline_transforms_reuse_cache() {
        assert!(Operation::Filter.reuses_cached_output());
        assert!(Operation::ComputeDistributions.reuses_cached_output());
        assert!(Operation::Binarize.reuses_cached_output());
        assert!(!Operation::AutoExclude.reuses_cached_output());
        assert!(!Operation::AutoLimit.reuses_cached_output());
        assert!(!Operation::NetworkAnalysis.reuses_cached_output());
        assert!(!Operation::DetectWaves.reuses_cached_output());
    }

    #[test]
    fn test_slot_assignment() {
        assert_eq!(Operation::Filter.slot(), SlotName::Main);
        assert_eq!(Operation::NetworkAnalysis.slot(), SlotName::Analysis);
        assert_eq!(Operation::DetectWaves.slot(), SlotName::Waves);
        assert_eq!(Operation::CharacterizeWaves.slot(), SlotName::Waves);
    }
}
