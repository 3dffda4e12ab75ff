//! The `assemble` entry point: visual, audio and captions composited into one file.

use crate::audio::AudioTrackBuilder;
use crate::captions::CaptionOverlayGenerator;
use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, SkipReason, Stage};
use crate::ffmpeg::{CompositeJob, MediaBackend};
use crate::media::NarrationAsset;
use crate::visual::VisualTrackBuilder;
use crate::{logi, logok, logw};
use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};

/// Optional feature a successful run had to give up.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    SkippedSource { path: PathBuf, reason: SkipReason },
    ConcatRetry { dropped: usize },
    SyntheticVisuals,
    MusicSkipped { path: PathBuf, reason: SkipReason },
    CaptionsTruncated { dropped_chunks: usize },
    NoCaptions,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::SkippedSource { path, reason } => {
                write!(f, "skipped clip {} ({})", path.display(), reason)
            }
            Degradation::ConcatRetry { dropped } => {
                write!(f, "dropped {} clip(s) after concat failures", dropped)
            }
            Degradation::SyntheticVisuals => f.write_str("used generated slides for visuals"),
            Degradation::MusicSkipped { path, reason } => {
                write!(f, "no background music: {} ({})", path.display(), reason)
            }
            Degradation::CaptionsTruncated { dropped_chunks } => {
                write!(f, "{} caption chunk(s) past the cap not shown", dropped_chunks)
            }
            Degradation::NoCaptions => f.write_str("empty transcript, no captions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub duration: f64,
    pub visual_loop_count: u32,
    pub visual_sources: usize,
    pub music_included: bool,
    pub caption_windows: Vec<(f64, f64)>,
    pub degradations: Vec<Degradation>,
}

impl AssemblyReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

struct Progress {
    stage: Stage,
}

impl Progress {
    fn advance(&mut self, to: Stage) {
        debug_assert_eq!(self.stage.next(), Some(to));
        self.stage = to;
        logi(format!("Stage complete: {}", to));
    }
}

fn output_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Builds the final video at `output`.
///
/// Nothing is written to `output` unless every stage succeeds; intermediates
/// live in a scratch directory removed on return.
pub async fn assemble(
    backend: &dyn MediaBackend,
    visual_sources: &[PathBuf],
    narration: &NarrationAsset,
    music: Option<&Path>,
    config: &AssemblyConfig,
    output: &Path,
) -> Result<AssemblyReport, AssemblyError> {
    config.validate()?;
    narration.check()?;

    let mut progress = Progress {
        stage: Stage::SourcesGathered,
    };
    let scratch = tempfile::Builder::new()
        .prefix("auto-video-")
        .tempdir()
        .context("creating scratch directory")
        .map_err(|e| AssemblyError::render(Stage::VisualBuilt, e))?;
    logi(format!(
        "Assembling {:.2}s video from {} clip candidate(s) in {}",
        narration.duration,
        visual_sources.len(),
        scratch.path().display()
    ));

    let mut degradations = Vec::new();

    let visual = VisualTrackBuilder::new(backend, config, scratch.path())
        .build(visual_sources, narration.duration)
        .await
        .map_err(|e| AssemblyError::render(Stage::VisualBuilt, e))?;
    progress.advance(Stage::VisualBuilt);
    degradations.extend(
        visual
            .skipped
            .iter()
            .cloned()
            .map(|(path, reason)| Degradation::SkippedSource { path, reason }),
    );
    if visual.dropped_on_retry > 0 {
        degradations.push(Degradation::ConcatRetry {
            dropped: visual.dropped_on_retry,
        });
    }
    if visual.is_synthetic() {
        degradations.push(Degradation::SyntheticVisuals);
    }

    let audio = AudioTrackBuilder::new(backend, config, scratch.path())
        .build(narration, music)
        .await
        .map_err(|e| AssemblyError::render(Stage::AudioBuilt, e))?;
    progress.advance(Stage::AudioBuilt);
    if let Some((path, reason)) = audio.music_skipped.clone() {
        degradations.push(Degradation::MusicSkipped { path, reason });
    }

    let captions = CaptionOverlayGenerator::new(config);
    let plan = captions.build(&narration.transcript, narration.duration);
    let cues = captions
        .overlay(&plan, scratch.path())
        .await
        .map_err(|e| AssemblyError::render(Stage::CaptionsOverlaid, e))?;
    progress.advance(Stage::CaptionsOverlaid);
    if plan.windows.is_empty() {
        degradations.push(Degradation::NoCaptions);
    }
    if plan.dropped_chunks > 0 {
        degradations.push(Degradation::CaptionsTruncated {
            dropped_chunks: plan.dropped_chunks,
        });
    }

    let dir = output_dir(output);
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating output dir {}", dir.display()))
        .map_err(|e| AssemblyError::render(Stage::Composited, e))?;
    let pending = tempfile::Builder::new()
        .prefix(".assembling-")
        .suffix(".mp4")
        .tempfile_in(dir)
        .context("creating temporary output")
        .map_err(|e| AssemblyError::render(Stage::Composited, e))?;

    let job = CompositeJob {
        video: visual.path.clone(),
        audio: audio.path.clone(),
        cues,
        style: captions.style(),
        duration: narration.duration,
        fps: config.fps,
        threads: config.render_threads,
    };
    logi(format!(
        "Rendering final video ({} caption window(s), {} thread(s))...",
        job.cues.len(),
        job.threads
    ));
    backend
        .composite(&job, pending.path())
        .await
        .map_err(|e| AssemblyError::render(Stage::Composited, e))?;
    progress.advance(Stage::Composited);

    pending
        .persist(output)
        .map_err(|e| AssemblyError::render(Stage::Written, anyhow::Error::new(e.error)))?;
    progress.advance(Stage::Written);

    for degradation in &degradations {
        logw(format!("Degraded: {}", degradation));
    }
    logok(format!("Wrote {} ({:.2}s)", output.display(), narration.duration));

    Ok(AssemblyReport {
        output: output.to_path_buf(),
        duration: narration.duration,
        visual_loop_count: visual.loop_count,
        visual_sources: visual.sources.len(),
        music_included: audio.bed.is_some(),
        caption_windows: plan.windows.iter().map(|w| (w.start, w.duration)).collect(),
        degradations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::fake::{Call, FakeBackend};

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn file(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out").join("final_video.mp4")
        }

        fn leftovers(&self) -> Vec<String> {
            match std::fs::read_dir(self.dir.path().join("out")) {
                Ok(entries) => entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    #[tokio::test]
    async fn full_run_matches_narration_duration() {
        let fx = Fixture::new();
        let clip = fx.file("clip.mp4");
        let music = fx.file("music.mp3");
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 300.0, words(900));
        let backend = FakeBackend::new()
            .with_video(&clip, 60.0)
            .with_audio(&music, 95.0);
        let config = AssemblyConfig::default();

        let report = assemble(&backend, &[clip], &narration, Some(music.as_path()), &config, &fx.output())
            .await
            .unwrap();

        assert_eq!(report.output, fx.output());
        assert!(fx.output().is_file());
        assert_eq!(report.duration, 300.0);
        assert_eq!(report.visual_loop_count, 5);
        assert!(report.music_included);
        assert_eq!(report.caption_windows.len(), 30);
        assert!(!report.is_degraded());
        assert_eq!(fx.leftovers(), vec!["final_video.mp4".to_string()]);

        let composite = backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Composite { cues, duration } => Some((cues, duration)),
                _ => None,
            })
            .unwrap();
        assert_eq!(composite.0.len(), 30);
        assert_eq!(composite.1, 300.0);
    }

    #[tokio::test]
    async fn degraded_run_still_writes_output() {
        let fx = Fixture::new();
        let broken = fx.file("broken.mp4");
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 240.0, "");
        let backend = FakeBackend::new();
        let config = AssemblyConfig::default();
        let missing_music = fx.dir.path().join("music.mp3");

        let report = assemble(
            &backend,
            &[broken.clone()],
            &narration,
            Some(missing_music.as_path()),
            &config,
            &fx.output(),
        )
        .await
        .unwrap();

        assert!(fx.output().is_file());
        assert!(!report.music_included);
        assert!(report.degradations.contains(&Degradation::SyntheticVisuals));
        assert!(report.degradations.contains(&Degradation::NoCaptions));
        assert!(report.degradations.contains(&Degradation::MusicSkipped {
            path: missing_music,
            reason: SkipReason::Missing
        }));
        assert!(report
            .degradations
            .iter()
            .any(|d| matches!(d, Degradation::SkippedSource { path, .. } if *path == broken)));
    }

    #[tokio::test]
    async fn same_inputs_same_shape() {
        let fx = Fixture::new();
        let a = fx.file("a.mp4");
        let b = fx.file("b.mp4");
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 173.4, words(412));
        let backend = FakeBackend::new().with_video(&a, 20.0).with_video(&b, 31.0);
        let config = AssemblyConfig::default();
        let sources = [a, b];

        let first = assemble(&backend, &sources, &narration, None, &config, &fx.output())
            .await
            .unwrap();
        let second = assemble(&backend, &sources, &narration, None, &config, &fx.output())
            .await
            .unwrap();

        assert_eq!(first.duration, second.duration);
        assert_eq!(first.caption_windows, second.caption_windows);
        assert_eq!(first.caption_windows.len(), 14);
    }

    #[tokio::test]
    async fn composite_failure_leaves_no_file_behind() {
        let fx = Fixture::new();
        let clip = fx.file("clip.mp4");
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 30.0, words(10));
        let backend = FakeBackend::new().with_video(&clip, 12.0).failing_composite();
        let config = AssemblyConfig::default();

        let err = assemble(&backend, &[clip], &narration, None, &config, &fx.output())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Composited);
        assert!(!fx.output().exists());
        assert!(fx.leftovers().is_empty());
    }

    #[tokio::test]
    async fn zero_length_narration_aborts_before_rendering() {
        let fx = Fixture::new();
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 0.0, words(10));
        let backend = FakeBackend::new();
        let config = AssemblyConfig::default();

        let err = assemble(&backend, &[], &narration, None, &config, &fx.output())
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::EmptyInput { .. }));
        assert!(backend.calls().is_empty());
        assert!(!fx.output().exists());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let fx = Fixture::new();
        let narration = NarrationAsset::new(fx.file("narration.mp3"), 10.0, words(10));
        let backend = FakeBackend::new();
        let mut config = AssemblyConfig::default();
        config.fps = 0;

        let err = assemble(&backend, &[], &narration, None, &config, &fx.output())
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidConfig(_)));
    }
}
