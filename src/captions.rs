//! Fixed-size word chunks laid back to back across the narration.

use crate::config::AssemblyConfig;
use crate::ffmpeg::{CaptionCue, CaptionStyle};
use crate::logw;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Rough glyph width as a fraction of font size.
const GLYPH_WIDTH_RATIO: f64 = 0.55;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionWindow {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl CaptionWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionPlan {
    pub windows: Vec<CaptionWindow>,
    /// Chunks past the cap that were not rendered.
    pub dropped_chunks: usize,
}

/// Splits `transcript` into `chunk_size`-word windows, at most `cap` of them,
/// evenly dividing `narration_duration`.
pub fn segment(transcript: &str, narration_duration: f64, chunk_size: usize, cap: usize) -> CaptionPlan {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 || cap == 0 || narration_duration <= 0.0 {
        return CaptionPlan::default();
    }

    let chunks: Vec<String> = words.chunks(chunk_size).map(|c| c.join(" ")).collect();
    let count = chunks.len().min(cap);
    let dropped_chunks = chunks.len() - count;

    let windows = chunks
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, text)| {
            let start = narration_duration * i as f64 / count as f64;
            let end = narration_duration * (i + 1) as f64 / count as f64;
            CaptionWindow {
                text,
                start,
                duration: end - start,
            }
        })
        .collect();

    CaptionPlan {
        windows,
        dropped_chunks,
    }
}

/// Greedy word wrap; words longer than a line get a line of their own.
pub fn wrap_text(text: &str, max_chars: usize) -> String {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

pub struct CaptionOverlayGenerator<'a> {
    config: &'a AssemblyConfig,
}

impl<'a> CaptionOverlayGenerator<'a> {
    pub fn new(config: &'a AssemblyConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, transcript: &str, narration_duration: f64) -> CaptionPlan {
        let plan = segment(
            transcript,
            narration_duration,
            self.config.caption_chunk_size,
            self.config.caption_cap,
        );
        if plan.dropped_chunks > 0 {
            logw(format!(
                "Transcript exceeds {} caption windows; {} trailing chunk(s) not shown",
                self.config.caption_cap, plan.dropped_chunks
            ));
        }
        plan
    }

    pub fn style(&self) -> CaptionStyle {
        CaptionStyle {
            font_size: self.config.caption_font_size,
            font_file: self.config.font_file.clone(),
        }
    }

    fn line_width(&self) -> usize {
        let glyph = self.config.caption_font_size.max(1) as f64 * GLYPH_WIDTH_RATIO;
        // keep a margin on both sides
        ((self.config.resolution.width as f64 * 0.9) / glyph).floor().max(8.0) as usize
    }

    /// Writes each window's wrapped text to `dir` and returns the timed cues.
    pub async fn overlay(&self, plan: &CaptionPlan, dir: &Path) -> Result<Vec<CaptionCue>> {
        let width = self.line_width();
        let mut cues = Vec::with_capacity(plan.windows.len());
        for (idx, window) in plan.windows.iter().enumerate() {
            let textfile = dir.join(format!("caption_{:03}.txt", idx + 1));
            fs::write(&textfile, wrap_text(&window.text, width))
                .await
                .with_context(|| format!("write caption {}", textfile.display()))?;
            cues.push(CaptionCue {
                textfile,
                start: window.start,
                end: window.end(),
            });
        }
        Ok(cues)
    }
}
