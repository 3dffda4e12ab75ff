//! Narration via an external text-to-speech program.
//!
//! The command is an argv template; `{out}` is replaced by the audio path and
//! the script is written to the program's stdin.

use crate::{logi, logok};
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const OUT_PLACEHOLDER: &str = "{out}";

pub fn render_command(template: &[String], out: &Path) -> Result<Vec<String>> {
    if template.is_empty() {
        anyhow::bail!("tts_command is empty");
    }
    if !template.iter().any(|arg| arg.contains(OUT_PLACEHOLDER)) {
        anyhow::bail!("tts_command must contain {} for the output path", OUT_PLACEHOLDER);
    }
    let out = out.display().to_string();
    Ok(template
        .iter()
        .map(|arg| arg.replace(OUT_PLACEHOLDER, &out))
        .collect())
}

pub async fn synthesize(template: &[String], script: &str, out: &Path) -> Result<()> {
    let args = render_command(template, out)?;
    if let Some(parent) = out.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    logi(format!("Running TTS ({}) -> {}", args[0], out.display()));

    let mut child = Command::new(&args[0])
        .args(&args[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn TTS program {}", args[0]))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .context("Failed to send script to TTS")?;
    }

    let output = child.wait_with_output().await.context("TTS program failed")?;
    if !output.status.success() {
        anyhow::bail!(
            "TTS program exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    if !out.is_file() {
        anyhow::bail!("TTS program produced no file at {}", out.display());
    }

    logok(format!("Narration written: {}", out.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn placeholder_is_required() {
        assert!(render_command(&argv(&["piper", "--model", "m.onnx"]), Path::new("n.wav")).is_err());
        assert!(render_command(&[], Path::new("n.wav")).is_err());

        let cmd = render_command(
            &argv(&["piper", "--output_file", "{out}"]),
            Path::new("/tmp/n.wav"),
        )
        .unwrap();
        assert_eq!(cmd, argv(&["piper", "--output_file", "/tmp/n.wav"]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_is_piped_to_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("voice").join("narration.txt");
        let template = argv(&["sh", "-c", "cat > \"$1\"", "sh", "{out}"]);

        synthesize(&template, "hello there", &out).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello there");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("narration.wav");
        let template = argv(&["sh", "-c", "exit 3", "{out}"]);
        assert!(synthesize(&template, "hi", &out).await.is_err());
    }
}
