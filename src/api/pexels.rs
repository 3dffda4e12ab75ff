use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SEARCH_URL: &str = "https://api.pexels.com/videos/search";
const PER_PAGE: u32 = 5;
const MAX_PAGES: u32 = 3;
/// Assumed clip length when Pexels omits one.
const DEFAULT_CLIP_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub videos: Vec<PexelsVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PexelsVideo {
    pub id: u64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PexelsVideoFile {
    pub link: String,
}

impl PexelsVideo {
    pub fn download_link(&self) -> Option<&str> {
        self.video_files.first().map(|f| f.link.as_str())
    }

    pub fn reported_duration(&self) -> f64 {
        self.duration.filter(|d| *d > 0.0).unwrap_or(DEFAULT_CLIP_SECONDS)
    }
}

/// Stock clip search and download.
pub struct PexelsClient {
    client: Client,
    api_key: Option<String>,
    search_url: String,
}

impl PexelsClient {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            search_url: SEARCH_URL.to_string(),
        }
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Downloads clips for `query` into `dir` until their reported durations
    /// add up to `required` seconds or the page budget runs out.
    pub async fn fetch_clips(&self, query: &str, required: f64, dir: &Path) -> Result<Vec<PathBuf>> {
        let Some(key) = self.api_key.as_deref() else {
            logw("No Pexels API key provided; using fallback visuals.");
            return Ok(Vec::new());
        };
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create dir {}", dir.display()))?;

        let mut files = Vec::new();
        let mut total = 0.0;
        let mut page = 1;
        while total < required && page <= MAX_PAGES {
            let found = match self.search(key, query, page).await {
                Ok(Some(found)) => found,
                Ok(None) => break,
                Err(err) => {
                    logw(format!("Pexels search page {} failed: {:#}", page, err));
                    break;
                }
            };
            for video in &found.videos {
                let Some(link) = video.download_link() else {
                    continue;
                };
                let dest = dir.join(format!("{}.mp4", video.id));
                match self.download(link, &dest).await {
                    Ok(()) => {
                        files.push(dest);
                        total += video.reported_duration();
                        if total >= required {
                            break;
                        }
                    }
                    Err(err) => logw(format!("Pexels download failed for {}: {:#}", video.id, err)),
                }
            }
            page += 1;
        }

        logok(format!(
            "Fetched {} stock clip(s) (~{:.0}s of {:.0}s wanted)",
            files.len(),
            total,
            required
        ));
        Ok(files)
    }

    async fn search(&self, key: &str, query: &str, page: u32) -> Result<Option<SearchResponse>> {
        logi(format!("Pexels search {:?} page {}", query, page));
        let resp = self
            .client
            .get(&self.search_url)
            .header("Authorization", key)
            .query(&[
                ("query", query.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("Pexels request failed")?;

        if !resp.status().is_success() {
            logw(format!("Pexels search failed HTTP {}", resp.status().as_u16()));
            return Ok(None);
        }
        let body = resp.json::<SearchResponse>().await.context("Pexels response parse failed")?;
        Ok(Some(body))
    }

    async fn download(&self, link: &str, dest: &Path) -> Result<()> {
        let result = self.stream_to_file(link, dest).await;
        if result.is_err() {
            let _ = fs::remove_file(dest).await;
        }
        result
    }

    async fn stream_to_file(&self, link: &str, dest: &Path) -> Result<()> {
        let mut resp = self
            .client
            .get(link)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await
            .context("clip request failed")?
            .error_for_status()?;
        let mut file = fs::File::create(dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;
        while let Some(chunk) = resp.chunk().await.context("clip body read failed")? {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("write {}", dest.display()))?;
        }
        file.flush().await?;
        Ok(())
    }
}
