use crate::error::{AssemblyError, SkipReason};
use crate::ffmpeg::MediaBackend;
use crate::reconcile::{ReconcileError, Reconciliation, reconcile};
use std::path::{Path, PathBuf};

pub use crate::config::Resolution;

/// One visual building block of a track.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Clip { path: PathBuf, duration: f64 },
    Slide { label: String, duration: f64 },
}

impl MediaSource {
    pub fn duration(&self) -> f64 {
        match self {
            MediaSource::Clip { duration, .. } | MediaSource::Slide { duration, .. } => *duration,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, MediaSource::Slide { .. })
    }
}

/// Outcome of trying to open a single candidate file.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLoad {
    Loaded(MediaSource),
    Skipped { path: PathBuf, reason: SkipReason },
}

impl SourceLoad {
    pub fn loaded(&self) -> Option<&MediaSource> {
        match self {
            SourceLoad::Loaded(source) => Some(source),
            SourceLoad::Skipped { .. } => None,
        }
    }
}

/// Sources played back to back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    sources: Vec<MediaSource>,
}

impl Track {
    pub fn new(sources: Vec<MediaSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[MediaSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.sources.iter().map(MediaSource::duration).sum()
    }

    pub fn is_synthetic(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(MediaSource::is_synthetic)
    }

    /// Drops the last source; used when concatenation has to be retried.
    pub fn pop(&mut self) -> Option<MediaSource> {
        self.sources.pop()
    }

    /// Repeats the whole track as needed and trims it to `required` seconds.
    pub fn reconcile(self, required: f64) -> Result<ReconciledTrack, ReconcileError> {
        let plan = reconcile(self.duration(), required)?;
        Ok(ReconciledTrack { track: self, plan })
    }
}

/// A track together with the loop/trim it needs to hit a duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTrack {
    pub track: Track,
    pub plan: Reconciliation,
}

impl ReconciledTrack {
    /// Length after looping and trimming.
    pub fn duration(&self) -> f64 {
        self.plan.trim_to
    }

    pub fn loop_count(&self) -> u32 {
        self.plan.loop_count
    }
}

/// Spoken narration plus its transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationAsset {
    pub path: PathBuf,
    pub duration: f64,
    pub transcript: String,
}

impl NarrationAsset {
    pub fn new(path: impl Into<PathBuf>, duration: f64, transcript: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            duration,
            transcript: transcript.into(),
        }
    }

    /// Builds the asset by measuring the audio file.
    pub async fn probe(
        backend: &dyn MediaBackend,
        path: &Path,
        transcript: impl Into<String>,
    ) -> Result<Self, AssemblyError> {
        if !path.is_file() {
            return Err(AssemblyError::EmptyInput {
                reason: format!("narration not found: {}", path.display()),
            });
        }
        let duration = backend
            .probe_duration(path)
            .await
            .map_err(|err| AssemblyError::EmptyInput {
                reason: format!("narration unreadable: {}: {:#}", path.display(), err),
            })?;
        let asset = Self::new(path, duration, transcript);
        asset.check()?;
        Ok(asset)
    }

    /// Fails when nothing downstream could be built from this narration.
    pub fn check(&self) -> Result<(), AssemblyError> {
        if !self.path.is_file() {
            return Err(AssemblyError::EmptyInput {
                reason: format!("narration not found: {}", self.path.display()),
            });
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(AssemblyError::EmptyInput {
                reason: format!("narration duration is {}", self.duration),
            });
        }
        Ok(())
    }
}
