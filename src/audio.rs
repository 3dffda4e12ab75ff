//! Narration over an optional, independently looped music bed.

use crate::config::AssemblyConfig;
use crate::error::SkipReason;
use crate::ffmpeg::{MediaBackend, MusicBed};
use crate::media::NarrationAsset;
use crate::reconcile::reconcile;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Always the narration duration.
    pub duration: f64,
    pub bed: Option<MusicBed>,
    pub music_skipped: Option<(PathBuf, SkipReason)>,
}

pub struct AudioTrackBuilder<'a> {
    backend: &'a dyn MediaBackend,
    config: &'a AssemblyConfig,
    scratch: &'a Path,
}

impl<'a> AudioTrackBuilder<'a> {
    pub fn new(backend: &'a dyn MediaBackend, config: &'a AssemblyConfig, scratch: &'a Path) -> Self {
        Self {
            backend,
            config,
            scratch,
        }
    }

    /// Plans the music layer; `Err` carries why it was left out.
    pub async fn load_bed(&self, music: &Path, narration_duration: f64) -> Result<MusicBed, SkipReason> {
        if !music.is_file() {
            return Err(SkipReason::Missing);
        }
        let duration = self
            .backend
            .probe_duration(music)
            .await
            .map_err(|err| SkipReason::Unreadable(format!("{:#}", err)))?;
        let plan = reconcile(duration, narration_duration).map_err(|_| SkipReason::ZeroDuration)?;
        Ok(MusicBed {
            path: music.to_path_buf(),
            plan,
            volume: self.config.music_attenuation,
        })
    }

    pub async fn build(&self, narration: &NarrationAsset, music: Option<&Path>) -> Result<AudioTrack> {
        let mut music_skipped = None;
        let bed = match music {
            Some(path) => match self.load_bed(path, narration.duration).await {
                Ok(bed) => {
                    logi(format!(
                        "Music bed {} at {:.0}% volume, {} play(s)",
                        path.display(),
                        bed.volume * 100.0,
                        bed.plan.loop_count
                    ));
                    Some(bed)
                }
                Err(reason) => {
                    logw(format!(
                        "Skipping music {}: {}; output will be narration-only.",
                        path.display(),
                        reason
                    ));
                    music_skipped = Some((path.to_path_buf(), reason));
                    None
                }
            },
            None => None,
        };

        let out = self.scratch.join("audio.m4a");
        self.backend
            .mix_audio(&narration.path, bed.as_ref(), narration.duration, &out)
            .await
            .context("mixing audio track")?;
        logok(format!("Audio track ready: {:.2}s", narration.duration));

        Ok(AudioTrack {
            path: out,
            duration: narration.duration,
            bed,
            music_skipped,
        })
    }
}
