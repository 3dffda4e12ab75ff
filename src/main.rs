use anyhow::{Context, Result};
use auto_video::api::pexels::PexelsClient;
use auto_video::config::JobConfig;
use auto_video::ffmpeg::FfmpegBackend;
use auto_video::metadata::generate_metadata;
use auto_video::script::generate_script;
use auto_video::{NarrationAsset, assemble, init, tts};
use rand::SeedableRng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

fn list_videos(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(OsStr::to_str)
                .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
                .unwrap_or(false)
        })
        .collect();
    out.sort();
    out
}

async fn load_or_write_script(job: &JobConfig) -> Result<String> {
    if let Some(path) = &job.transcript {
        return fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read transcript {}", path.display()));
    }
    let mut rng = rand::rngs::StdRng::from_entropy();
    let script = generate_script(job.topic(), job.assembly.script_word_target(), &mut rng);
    info!("Generated script ({} words)", auto_video::script::word_count(&script));
    Ok(script)
}

async fn run(job_path: &Path) -> Result<()> {
    let job = JobConfig::load(job_path).await?;
    let output_dir = job.output.parent().map(Path::to_path_buf).unwrap_or_default();
    init::ensure_directories(&[output_dir, job.assets_dir.clone()]).await?;

    let missing = init::check_tools().await;
    if !missing.is_empty() {
        anyhow::bail!("required tools not found in PATH: {}", missing.join(", "));
    }

    let topic = job.topic().to_string();
    info!("Topic: {}", topic);
    let script = load_or_write_script(&job).await?;

    let narration_path = match &job.narration {
        Some(path) => path.clone(),
        None => {
            let template = job.tts_command.as_deref().unwrap_or_default();
            let path = job.assets_dir.join("narration.wav");
            tts::synthesize(template, &script, &path).await?;
            path
        }
    };

    let backend = FfmpegBackend;
    let narration = NarrationAsset::probe(&backend, &narration_path, script).await?;

    let mut clips = match &job.visuals_dir {
        Some(dir) => list_videos(dir),
        None => Vec::new(),
    };
    if clips.is_empty() {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let pexels = PexelsClient::new(client, job.pexels_api_key.clone());
        clips = pexels
            .fetch_clips(&topic, job.assembly.target_duration as f64, &job.assets_dir.join("clips"))
            .await
            .unwrap_or_else(|err| {
                warn!("Stock clip fetch failed: {:#}", err);
                Vec::new()
            });
    }

    let mut config = job.assembly.clone();
    if job.topic.is_some() {
        config.slide_label = topic.clone();
    }

    let report = assemble(
        &backend,
        &clips,
        &narration,
        job.music.as_deref(),
        &config,
        &job.output,
    )
    .await?;

    let meta = generate_metadata(&topic, report.duration, chrono::Utc::now().date_naive());
    let meta_path = report.output.with_extension("json");
    fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
        .await
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;

    info!("Video: {} ({:.2}s)", report.output.display(), report.duration);
    info!("Metadata: {}", meta_path.display());
    for degradation in &report.degradations {
        warn!("Skipped feature: {}", degradation);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let job_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    if let Err(err) = run(&job_path).await {
        if let Some(assembly) = err.downcast_ref::<auto_video::AssemblyError>() {
            tracing::error!("Assembly failed at {}: {}", assembly.stage(), assembly);
        } else {
            tracing::error!("{:#}", err);
        }
        std::process::exit(1);
    }
    Ok(())
}
