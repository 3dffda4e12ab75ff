use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::logi;

pub async fn ensure_directories<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() || dir.exists() {
            continue;
        }
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        logi(format!("Created directory: {}", dir.display()));
    }
    Ok(())
}

async fn tool_available(name: &str) -> bool {
    match tokio::process::Command::new(name)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Names of required media tools missing from PATH.
pub async fn check_tools() -> Vec<&'static str> {
    let mut missing = Vec::new();
    for tool in ["ffmpeg", "ffprobe"] {
        if !tool_available(tool).await {
            missing.push(tool);
        }
    }
    missing
}
