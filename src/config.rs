use crate::error::AssemblyError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Knobs for one `assemble` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_target_duration")]
    pub target_duration: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_caption_chunk_size")]
    pub caption_chunk_size: usize,
    #[serde(default = "default_caption_cap")]
    pub caption_cap: usize,
    #[serde(default = "default_music_attenuation")]
    pub music_attenuation: f64,
    #[serde(default = "default_fallback_slide_count")]
    pub fallback_slide_count: u32,
    #[serde(default = "default_render_threads")]
    pub render_threads: u32,
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    #[serde(default = "default_caption_font_size")]
    pub caption_font_size: u32,
    #[serde(default = "default_slide_font_size")]
    pub slide_font_size: u32,
    #[serde(default = "default_slide_label")]
    pub slide_label: String,
}

fn default_target_duration() -> u32 {
    300
}

fn default_fps() -> u32 {
    24
}

fn default_caption_chunk_size() -> usize {
    30
}

fn default_caption_cap() -> usize {
    40
}

fn default_music_attenuation() -> f64 {
    0.15
}

fn default_fallback_slide_count() -> u32 {
    6
}

fn default_render_threads() -> u32 {
    2
}

fn default_caption_font_size() -> u32 {
    36
}

fn default_slide_font_size() -> u32 {
    70
}

fn default_slide_label() -> String {
    "Trending Topic".to_string()
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            target_duration: default_target_duration(),
            resolution: Resolution::default(),
            fps: default_fps(),
            caption_chunk_size: default_caption_chunk_size(),
            caption_cap: default_caption_cap(),
            music_attenuation: default_music_attenuation(),
            fallback_slide_count: default_fallback_slide_count(),
            render_threads: default_render_threads(),
            font_file: None,
            caption_font_size: default_caption_font_size(),
            slide_font_size: default_slide_font_size(),
            slide_label: default_slide_label(),
        }
    }
}

impl AssemblyConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        let fail = |msg: String| -> Result<(), AssemblyError> { Err(AssemblyError::InvalidConfig(msg)) };

        if self.target_duration == 0 {
            return fail("target_duration must be > 0".to_string());
        }
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return fail(format!("resolution {}x{} has a zero side", width, height));
        }
        // yuv420p subsampling
        if width % 2 != 0 || height % 2 != 0 {
            return fail(format!("resolution {}x{} must be even", width, height));
        }
        if self.fps == 0 {
            return fail("fps must be > 0".to_string());
        }
        if self.caption_chunk_size == 0 {
            return fail("caption_chunk_size must be > 0".to_string());
        }
        if self.caption_cap == 0 {
            return fail("caption_cap must be > 0".to_string());
        }
        if !(self.music_attenuation > 0.0 && self.music_attenuation <= 1.0) {
            return fail(format!(
                "music_attenuation {} outside (0, 1]",
                self.music_attenuation
            ));
        }
        if self.fallback_slide_count == 0 {
            return fail("fallback_slide_count must be > 0".to_string());
        }
        if self.render_threads == 0 {
            return fail("render_threads must be > 0".to_string());
        }
        Ok(())
    }

    /// Script length that fills `target_duration` at a steady narration pace.
    pub fn script_word_target(&self) -> usize {
        (self.target_duration as f64 * 2.5).round() as usize
    }
}

/// Job file consumed by the `auto-video` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub narration: Option<PathBuf>,
    #[serde(default)]
    pub transcript: Option<PathBuf>,
    #[serde(default)]
    pub visuals_dir: Option<PathBuf>,
    #[serde(default)]
    pub music: Option<PathBuf>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default)]
    pub tts_command: Option<Vec<String>>,
    #[serde(default)]
    pub pexels_api_key: Option<String>,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

fn default_output() -> PathBuf {
    PathBuf::from("outputs/final_video.mp4")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

impl JobConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read job config: {}", path.as_ref().display()))?;
        let mut job: JobConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse job config: {}", path.as_ref().display()))?;

        if job.pexels_api_key.as_deref().is_none_or(str::is_empty) {
            job.pexels_api_key = std::env::var("PEXELS_API_KEY").ok().filter(|k| !k.is_empty());
        }

        if job.narration.is_none() && job.tts_command.is_none() {
            anyhow::bail!("job config: either narration or tts_command is required");
        }
        job.assembly
            .validate()
            .context("job config: assembly section invalid")?;

        Ok(job)
    }

    pub fn topic(&self) -> &str {
        self.topic
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("latest tech news")
    }
}
