//! Turns candidate clips into one letterboxed, duration-matched video track.

use crate::config::AssemblyConfig;
use crate::error::SkipReason;
use crate::ffmpeg::{MediaBackend, NoVideoStream, SlideSpec, VideoFormat};
use crate::media::{MediaSource, SourceLoad, Track};
use crate::reconcile::reconcile;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A rendered visual track and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualTrack {
    pub path: PathBuf,
    pub duration: f64,
    pub loop_count: u32,
    pub sources: Vec<MediaSource>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    /// Clips dropped from the tail after failed concatenations.
    pub dropped_on_retry: usize,
}

impl VisualTrack {
    pub fn is_synthetic(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(MediaSource::is_synthetic)
    }
}

pub struct VisualTrackBuilder<'a> {
    backend: &'a dyn MediaBackend,
    config: &'a AssemblyConfig,
    scratch: &'a Path,
}

impl<'a> VisualTrackBuilder<'a> {
    pub fn new(backend: &'a dyn MediaBackend, config: &'a AssemblyConfig, scratch: &'a Path) -> Self {
        Self {
            backend,
            config,
            scratch,
        }
    }

    fn format(&self) -> VideoFormat {
        VideoFormat {
            resolution: self.config.resolution,
            fps: self.config.fps,
        }
    }

    /// Probes every candidate; failures become `Skipped` entries.
    pub async fn load_sources(&self, candidates: &[PathBuf]) -> Vec<SourceLoad> {
        let mut loads = Vec::with_capacity(candidates.len());
        for path in candidates {
            let load = self.load_one(path).await;
            match &load {
                SourceLoad::Loaded(source) => {
                    logok(format!("Loaded clip {} ({:.2}s)", path.display(), source.duration()))
                }
                SourceLoad::Skipped { reason, .. } => {
                    logw(format!("Skipping clip {}: {}", path.display(), reason))
                }
            }
            loads.push(load);
        }
        loads
    }

    async fn load_one(&self, path: &Path) -> SourceLoad {
        let skip = |reason| SourceLoad::Skipped {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return skip(SkipReason::Missing);
        }
        match self.backend.probe_video(path).await {
            Ok(probe) if probe.duration.is_finite() && probe.duration > 0.0 => {
                SourceLoad::Loaded(MediaSource::Clip {
                    path: path.to_path_buf(),
                    duration: probe.duration,
                })
            }
            Ok(_) => skip(SkipReason::ZeroDuration),
            Err(err) if err.downcast_ref::<NoVideoStream>().is_some() => {
                skip(SkipReason::NoVideoStream)
            }
            Err(err) => skip(SkipReason::Unreadable(format!("{:#}", err))),
        }
    }

    /// Equal-length label slides that together fill the configured target.
    pub fn fallback_slides(&self) -> Track {
        let count = self.config.fallback_slide_count.max(1);
        let duration = self.config.target_duration as f64 / count as f64;
        let slides = (1..=count)
            .map(|i| MediaSource::Slide {
                label: format!("{} {}", self.config.slide_label, i),
                duration,
            })
            .collect();
        Track::new(slides)
    }

    pub async fn build(&self, candidates: &[PathBuf], target_duration: f64) -> Result<VisualTrack> {
        let loads = self.load_sources(candidates).await;
        let mut skipped = Vec::new();
        let mut sources = Vec::new();
        for load in loads {
            match load {
                SourceLoad::Loaded(source) => sources.push(source),
                SourceLoad::Skipped { path, reason } => skipped.push((path, reason)),
            }
        }

        let mut track = Track::new(sources);
        if track.is_empty() {
            logw("No usable clips; falling back to generated slides.");
            track = self.fallback_slides();
        }

        let mut dropped_on_retry = 0;
        let concat_out = self.scratch.join("visual_concat.mp4");
        loop {
            let inputs = self.materialize(&track).await?;
            logi(format!(
                "Concatenating {} visual source(s) ({:.2}s)",
                inputs.len(),
                track.duration()
            ));
            match self.backend.concat_visuals(&inputs, &self.format(), &concat_out).await {
                Ok(()) => break,
                Err(err) if !track.is_synthetic() => {
                    let dropped = track.pop();
                    dropped_on_retry += 1;
                    logw(format!(
                        "Concat failed ({:#}); retrying without {}",
                        err,
                        dropped
                            .as_ref()
                            .map(|s| match s {
                                MediaSource::Clip { path, .. } => path.display().to_string(),
                                MediaSource::Slide { label, .. } => label.clone(),
                            })
                            .unwrap_or_default()
                    ));
                    if track.is_empty() {
                        logw("Every clip combination failed; falling back to generated slides.");
                        track = self.fallback_slides();
                    }
                }
                Err(err) => return Err(err.context("concatenating fallback slides")),
            }
        }

        // fps resampling and overhanging audio make the concat shorter than the probed sum
        let available = match self.backend.probe_duration(&concat_out).await {
            Ok(measured) if measured > 0.0 => measured,
            Ok(_) | Err(_) => {
                logw(format!(
                    "Could not measure {}; using summed source duration {:.2}s",
                    concat_out.display(),
                    track.duration()
                ));
                track.duration()
            }
        };
        let plan = reconcile(available, target_duration).context("reconciling visual track duration")?;
        if plan.needs_loop() {
            logi(format!(
                "Visual material {:.2}s < {:.2}s; looping whole track {}x",
                available, target_duration, plan.loop_count
            ));
        }

        let out = self.scratch.join("visual.mp4");
        self.backend
            .loop_and_trim(&concat_out, &plan, &out)
            .await
            .context("looping/trimming visual track")?;
        logok(format!("Visual track ready: {:.2}s", plan.trim_to));

        Ok(VisualTrack {
            path: out,
            duration: plan.trim_to,
            loop_count: plan.loop_count,
            sources: track.sources().to_vec(),
            skipped,
            dropped_on_retry,
        })
    }

    /// Clip paths as-is; slides rendered into the scratch dir first.
    async fn materialize(&self, track: &Track) -> Result<Vec<PathBuf>> {
        let mut inputs = Vec::with_capacity(track.len());
        for (idx, source) in track.sources().iter().enumerate() {
            match source {
                MediaSource::Clip { path, .. } => inputs.push(path.clone()),
                MediaSource::Slide { label, duration } => {
                    let out = self.scratch.join(format!("slide_{}.mp4", idx + 1));
                    if !out.is_file() {
                        let spec = SlideSpec {
                            label: label.clone(),
                            duration: *duration,
                            font_size: self.config.slide_font_size,
                            font_file: self.config.font_file.clone(),
                        };
                        self.backend
                            .render_slide(&spec, &self.format(), &out)
                            .await
                            .with_context(|| format!("rendering slide {:?}", label))?;
                    }
                    inputs.push(out);
                }
            }
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::fake::{Call, FakeBackend};

    fn clip_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"clip").unwrap();
        path
    }

    #[tokio::test]
    async fn one_minute_clip_loops_five_times_to_fill_five_minutes() {
        let dir = tempfile::tempdir().unwrap();
        let clip = clip_file(dir.path(), "a.mp4");
        let backend = FakeBackend::new().with_video(&clip, 60.0);
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[clip.clone()], 300.0)
            .await
            .unwrap();

        assert_eq!(track.loop_count, 5);
        assert_eq!(track.duration, 300.0);
        assert!(!track.is_synthetic());
        assert!(track.path.is_file());
        assert_eq!(
            backend.calls(),
            vec![
                Call::Concat { inputs: vec![clip] },
                Call::LoopTrim {
                    loop_count: 5,
                    trim_to: 300.0
                },
            ]
        );
    }

    #[tokio::test]
    async fn no_sources_yields_six_fifty_second_slides() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new();
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[], 300.0)
            .await
            .unwrap();

        assert!(track.is_synthetic());
        assert_eq!(track.sources.len(), 6);
        assert!(track.sources.iter().all(|s| s.duration() == 50.0));
        assert_eq!(track.duration, 300.0);
        assert_eq!(track.loop_count, 1);

        let slides: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Slide { label, duration } => Some((label, duration)),
                _ => None,
            })
            .collect();
        assert_eq!(slides.len(), 6);
        assert_eq!(slides[0], ("Trending Topic 1".to_string(), 50.0));
    }

    #[tokio::test]
    async fn unreadable_sources_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let good = clip_file(dir.path(), "good.mp4");
        let corrupt = clip_file(dir.path(), "corrupt.mp4");
        let missing = dir.path().join("missing.mp4");
        let backend = FakeBackend::new().with_video(&good, 40.0);
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[corrupt.clone(), good.clone(), missing.clone()], 100.0)
            .await
            .unwrap();

        assert_eq!(track.sources.len(), 1);
        assert_eq!(track.loop_count, 3);
        assert_eq!(track.skipped.len(), 2);
        assert!(matches!(track.skipped[0], (ref p, SkipReason::Unreadable(_)) if *p == corrupt));
        assert_eq!(track.skipped[1], (missing, SkipReason::Missing));
    }

    #[tokio::test]
    async fn all_sources_failing_falls_back_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = clip_file(dir.path(), "a.mp4");
        let b = clip_file(dir.path(), "b.mp4");
        let backend = FakeBackend::new();
        let mut config = AssemblyConfig::default();
        config.fallback_slide_count = 5;

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[a, b], 420.0)
            .await
            .unwrap();

        assert!(track.is_synthetic());
        assert_eq!(track.sources.len(), 5);
        assert_eq!(track.duration, 420.0);
        assert_eq!(track.loop_count, 2);
        assert_eq!(track.skipped.len(), 2);
    }

    #[tokio::test]
    async fn concat_failure_drops_last_source_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let a = clip_file(dir.path(), "a.mp4");
        let b = clip_file(dir.path(), "b.mp4");
        let c = clip_file(dir.path(), "c.mp4");
        let backend = FakeBackend::new()
            .with_video(&a, 30.0)
            .with_video(&b, 30.0)
            .with_video(&c, 30.0)
            .concat_limit(2);
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[a.clone(), b.clone(), c], 90.0)
            .await
            .unwrap();

        assert_eq!(track.dropped_on_retry, 1);
        assert_eq!(track.sources.len(), 2);
        assert_eq!(track.loop_count, 2);
        assert_eq!(track.duration, 90.0);
        let concats: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Concat { .. }))
            .collect();
        assert_eq!(concats.len(), 2);
        assert_eq!(concats[1], Call::Concat { inputs: vec![a, b] });
    }

    #[tokio::test]
    async fn persistent_concat_failure_ends_in_slides() {
        let dir = tempfile::tempdir().unwrap();
        let a = clip_file(dir.path(), "a.mp4");
        let b = clip_file(dir.path(), "b.mp4");
        let backend = FakeBackend::new()
            .with_video(&a, 30.0)
            .with_video(&b, 30.0)
            .failing_concat();
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[a, b], 300.0)
            .await
            .unwrap();

        assert!(track.is_synthetic());
        assert_eq!(track.dropped_on_retry, 2);
        assert_eq!(track.duration, 300.0);
    }

    #[tokio::test]
    async fn loop_plan_uses_measured_concat_length() {
        let dir = tempfile::tempdir().unwrap();
        let a = clip_file(dir.path(), "a.mp4");
        let b = clip_file(dir.path(), "b.mp4");
        let backend = FakeBackend::new()
            .with_video(&a, 150.04)
            .with_video(&b, 150.04)
            .with_audio(&dir.path().join("visual_concat.mp4"), 299.96);
        let config = AssemblyConfig::default();

        let track = VisualTrackBuilder::new(&backend, &config, dir.path())
            .build(&[a, b], 300.0)
            .await
            .unwrap();

        assert_eq!(track.loop_count, 2);
        assert_eq!(track.duration, 300.0);
        assert!(backend.calls().contains(&Call::LoopTrim {
            loop_count: 2,
            trim_to: 300.0
        }));
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let a = clip_file(dir.path(), "a.mp4");
        let b = clip_file(dir.path(), "b.mp4");
        let backend = FakeBackend::new().with_video(&a, 21.0).with_video(&b, 13.5);
        let config = AssemblyConfig::default();
        let builder = VisualTrackBuilder::new(&backend, &config, dir.path());

        let first = builder.build(&[a.clone(), b.clone()], 187.0).await.unwrap();
        let second = builder.build(&[a, b], 187.0).await.unwrap();
        assert_eq!(first, second);
    }
}
