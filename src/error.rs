//! Fatal assembly errors and the per-source skip reasons that never escape a builder.

use std::fmt;
use thiserror::Error;

/// Pipeline states, in the only order a run may move through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    SourcesGathered,
    VisualBuilt,
    AudioBuilt,
    CaptionsOverlaid,
    Composited,
    Written,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::SourcesGathered => Some(Stage::VisualBuilt),
            Stage::VisualBuilt => Some(Stage::AudioBuilt),
            Stage::AudioBuilt => Some(Stage::CaptionsOverlaid),
            Stage::CaptionsOverlaid => Some(Stage::Composited),
            Stage::Composited => Some(Stage::Written),
            Stage::Written => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SourcesGathered => "source gathering",
            Stage::VisualBuilt => "visual track",
            Stage::AudioBuilt => "audio track",
            Stage::CaptionsOverlaid => "caption overlay",
            Stage::Composited => "composite",
            Stage::Written => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("narration unusable: {reason}")]
    EmptyInput { reason: String },

    #[error("{stage} failed: {source:#}")]
    Render {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AssemblyError {
    pub fn render(stage: Stage, source: anyhow::Error) -> Self {
        AssemblyError::Render { stage, source }
    }

    /// The stage the run was trying to reach when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            AssemblyError::EmptyInput { .. } | AssemblyError::InvalidConfig(_) => {
                Stage::SourcesGathered
            }
            AssemblyError::Render { stage, .. } => *stage,
        }
    }
}

/// Why a visual or music source was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    Unreadable(String),
    NoVideoStream,
    ZeroDuration,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing => f.write_str("file not found"),
            SkipReason::Unreadable(why) => write!(f, "unreadable ({})", why),
            SkipReason::NoVideoStream => f.write_str("no video stream"),
            SkipReason::ZeroDuration => f.write_str("zero duration"),
        }
    }
}
