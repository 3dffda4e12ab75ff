use crate::config::Resolution;
use crate::reconcile::Reconciliation;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

const AUDIO_BITRATE: &str = "192k";

/// Frame geometry shared by every visual the pipeline renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub resolution: Resolution,
    pub fps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

#[derive(Error, Debug)]
#[error("no video stream")]
pub struct NoVideoStream;

/// A generated label-on-black slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideSpec {
    pub label: String,
    pub duration: f64,
    pub font_size: u32,
    pub font_file: Option<PathBuf>,
}

/// Background music layered under narration.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicBed {
    pub path: PathBuf,
    pub plan: Reconciliation,
    pub volume: f64,
}

/// One caption drawn over `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub textfile: PathBuf,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_size: u32,
    pub font_file: Option<PathBuf>,
}

/// Inputs of the final encode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeJob {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub cues: Vec<CaptionCue>,
    pub style: CaptionStyle,
    pub duration: f64,
    pub fps: u32,
    pub threads: u32,
}

/// Everything the builders need from a media toolkit.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe_video(&self, path: &Path) -> Result<VideoProbe>;
    async fn probe_duration(&self, path: &Path) -> Result<f64>;
    async fn render_slide(&self, slide: &SlideSpec, format: &VideoFormat, out: &Path) -> Result<()>;
    async fn concat_visuals(&self, inputs: &[PathBuf], format: &VideoFormat, out: &Path) -> Result<()>;
    async fn loop_and_trim(&self, input: &Path, plan: &Reconciliation, out: &Path) -> Result<()>;
    async fn mix_audio(
        &self,
        narration: &Path,
        bed: Option<&MusicBed>,
        duration: f64,
        out: &Path,
    ) -> Result<()>;
    async fn composite(&self, job: &CompositeJob, out: &Path) -> Result<()>;
}

/// Drives the `ffmpeg`/`ffprobe` binaries found on PATH.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.trim().lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        return Err(anyhow::anyhow!("{} exited with {}: {}", args[0], output.status, tail));
    }

    Ok(())
}

async fn ensure_output(out: &Path) -> Result<()> {
    match tokio::fs::metadata(out).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(anyhow::anyhow!("ffmpeg produced no output at {}", out.display())),
    }
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        return Err(NoVideoStream.into());
    }
    let mut parts = text.split('x');
    let w = parts.next().and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
    let h = parts.next().and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("Invalid dimensions: {:?}", text));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    text.parse::<f64>()
        .with_context(|| format!("Invalid duration {:?}", text))
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe_video(&self, path: &Path) -> Result<VideoProbe> {
        let (width, height) = ffprobe_video_dimensions(path).await?;
        let duration = ffprobe_duration_seconds(path).await?;
        Ok(VideoProbe {
            width,
            height,
            duration,
        })
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        ffprobe_duration_seconds(path).await
    }

    async fn render_slide(&self, slide: &SlideSpec, format: &VideoFormat, out: &Path) -> Result<()> {
        let textfile = out.with_extension("txt");
        tokio::fs::write(&textfile, slide.label.as_bytes())
            .await
            .with_context(|| format!("write slide label {}", textfile.display()))?;
        run_cmd(&slide_args(slide, &textfile, format, out)?).await?;
        ensure_output(out).await
    }

    async fn concat_visuals(&self, inputs: &[PathBuf], format: &VideoFormat, out: &Path) -> Result<()> {
        run_cmd(&concat_args(inputs, format, out)).await?;
        ensure_output(out).await
    }

    async fn loop_and_trim(&self, input: &Path, plan: &Reconciliation, out: &Path) -> Result<()> {
        run_cmd(&loop_trim_args(input, plan, out)).await?;
        ensure_output(out).await
    }

    async fn mix_audio(
        &self,
        narration: &Path,
        bed: Option<&MusicBed>,
        duration: f64,
        out: &Path,
    ) -> Result<()> {
        run_cmd(&mix_audio_args(narration, bed, duration, out)).await?;
        ensure_output(out).await
    }

    async fn composite(&self, job: &CompositeJob, out: &Path) -> Result<()> {
        let args = composite_args(job, out)?;
        if let Err(err) = run_cmd(&args).await {
            logw(format!("Final encode failed: {:#}", err));
            return Err(err);
        }
        ensure_output(out).await
    }
}

fn base_args() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

fn h264_args() -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
    ]
}

fn filter_escape_regex() -> Result<&'static Regex> {
    static ESCAPE_RE: OnceCell<Regex> = OnceCell::new();
    ESCAPE_RE.get_or_try_init(|| {
        Regex::new(r"([\\:'\[\],;])").context("failed to compile filter escape regex")
    })
}

/// Escapes a path for use inside a single-quoted filter option value.
///
/// Option-level escapes come first; each resulting `'` is then spliced out of
/// the graph-level quote as `'\''`.
pub fn escape_filter_path(path: &Path) -> Result<String> {
    let raw = path.to_string_lossy().replace('\\', "/");
    let escaped = filter_escape_regex()?.replace_all(&raw, r"\$1");
    Ok(escaped.replace('\'', r"'\''"))
}

/// Letterbox any source into the output frame.
pub fn normalize_filter(format: &VideoFormat) -> String {
    let Resolution { width, height } = format.resolution;
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps},format=yuv420p",
        w = width,
        h = height,
        fps = format.fps
    )
}

fn drawtext_font(font_file: Option<&Path>) -> Result<String> {
    match font_file {
        Some(font) => Ok(format!(":fontfile='{}'", escape_filter_path(font)?)),
        None => Ok(String::new()),
    }
}

pub fn slide_args(
    slide: &SlideSpec,
    textfile: &Path,
    format: &VideoFormat,
    out: &Path,
) -> Result<Vec<String>> {
    let Resolution { width, height } = format.resolution;
    let filter = format!(
        "drawtext=textfile='{}'{}:expansion=none:fontsize={}:fontcolor=white:x=(w-text_w)/2:y=(h-text_h)/2,{}",
        escape_filter_path(textfile)?,
        drawtext_font(slide.font_file.as_deref())?,
        slide.font_size,
        normalize_filter(format)
    );

    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c=black:s={}x{}:r={}:d={:.3}",
            width, height, format.fps, slide.duration
        ),
        "-vf".to_string(),
        filter,
        "-t".to_string(),
        format!("{:.3}", slide.duration),
    ]);
    args.extend(h264_args());
    args.push("-an".to_string());
    args.push(out.display().to_string());
    Ok(args)
}

pub fn concat_args(inputs: &[PathBuf], format: &VideoFormat, out: &Path) -> Vec<String> {
    let mut args = base_args();
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.display().to_string());
    }

    let normalize = normalize_filter(format);
    let mut graph = String::new();
    for i in 0..inputs.len() {
        graph.push_str(&format!("[{}:v]{}[v{}];", i, normalize, i));
    }
    for i in 0..inputs.len() {
        graph.push_str(&format!("[v{}]", i));
    }
    graph.push_str(&format!("concat=n={}:v=1:a=0[v]", inputs.len()));

    args.extend([
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[v]".to_string(),
        "-an".to_string(),
    ]);
    args.extend(h264_args());
    args.push(out.display().to_string());
    args
}

pub fn loop_trim_args(input: &Path, plan: &Reconciliation, out: &Path) -> Vec<String> {
    let mut args = base_args();
    if plan.needs_loop() {
        args.push("-stream_loop".to_string());
        args.push(plan.extra_loops().to_string());
    }
    args.extend([
        "-i".to_string(),
        input.display().to_string(),
        "-t".to_string(),
        format!("{:.3}", plan.trim_to),
        "-an".to_string(),
    ]);
    args.extend(h264_args());
    args.push(out.display().to_string());
    args
}

pub fn mix_audio_args(
    narration: &Path,
    bed: Option<&MusicBed>,
    duration: f64,
    out: &Path,
) -> Vec<String> {
    let mut args = base_args();
    args.push("-i".to_string());
    args.push(narration.display().to_string());

    match bed {
        Some(bed) => {
            if bed.plan.needs_loop() {
                args.push("-stream_loop".to_string());
                args.push(bed.plan.extra_loops().to_string());
            }
            args.push("-i".to_string());
            args.push(bed.path.display().to_string());
            args.extend([
                "-filter_complex".to_string(),
                format!(
                    "[1:a]volume={:.3},atrim=0:{:.3},asetpts=PTS-STARTPTS[bed];[0:a][bed]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[a]",
                    bed.volume, bed.plan.trim_to
                ),
                "-map".to_string(),
                "[a]".to_string(),
            ]);
        }
        None => {
            args.push("-map".to_string());
            args.push("0:a".to_string());
        }
    }

    args.extend([
        "-t".to_string(),
        format!("{:.3}", duration),
        "-vn".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        out.display().to_string(),
    ]);
    args
}

/// Chain of drawtext filters, one per cue, pinned bottom-center.
pub fn caption_filter(cues: &[CaptionCue], style: &CaptionStyle) -> Result<String> {
    let font = drawtext_font(style.font_file.as_deref())?;
    let mut parts = Vec::with_capacity(cues.len());
    for cue in cues {
        parts.push(format!(
            "drawtext=textfile='{}'{}:expansion=none:fontsize={}:fontcolor=white:line_spacing=6:box=1:boxcolor=black@0.55:boxborderw=12:x=(w-text_w)/2:y=h-text_h-{}:enable='gte(t,{:.3})*lt(t,{:.3})'",
            escape_filter_path(&cue.textfile)?,
            font,
            style.font_size,
            style.font_size * 2,
            cue.start,
            cue.end
        ));
    }
    Ok(parts.join(","))
}

pub fn composite_args(job: &CompositeJob, out: &Path) -> Result<Vec<String>> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        job.video.display().to_string(),
        "-i".to_string(),
        job.audio.display().to_string(),
    ]);

    if job.cues.is_empty() {
        args.extend(["-map".to_string(), "0:v".to_string()]);
    } else {
        args.extend([
            "-filter_complex".to_string(),
            format!("[0:v]{}[v]", caption_filter(&job.cues, &job.style)?),
            "-map".to_string(),
            "[v]".to_string(),
        ]);
    }
    args.extend(["-map".to_string(), "1:a".to_string()]);
    args.extend(h264_args());
    args.extend([
        "-r".to_string(),
        job.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-threads".to_string(),
        job.threads.to_string(),
        "-t".to_string(),
        format!("{:.3}", job.duration),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        out.display().to_string(),
    ]);
    Ok(args)
}
