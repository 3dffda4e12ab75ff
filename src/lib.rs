use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod assemble;
pub mod audio;
pub mod captions;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod metadata;
pub mod reconcile;
pub mod script;
pub mod tts;
pub mod visual;

pub use assemble::{AssemblyReport, Degradation, assemble};
pub use config::AssemblyConfig;
pub use error::{AssemblyError, Stage};
pub use media::NarrationAsset;

pub type AssemblyLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<AssemblyLogHook>>> = Lazy::new(|| Mutex::new(None));

/// Registers a callback that receives every tagged progress line.
pub fn set_log_hook(hook: Option<AssemblyLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!("[{}] {}", tag, message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub mod init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_hook_receives_tagged_lines() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: AssemblyLogHook = Arc::new(Mutex::new(move |line: &str| {
            if let Ok(mut lines) = sink.lock() {
                lines.push(line.to_string());
            }
        }));

        set_log_hook(Some(hook));
        logw("hook-probe-line");
        set_log_hook(None);
        logw("hook-probe-after-removal");

        let lines = seen.lock().unwrap();
        assert!(lines.iter().any(|l| l == "[WARN] hook-probe-line"));
        assert!(!lines.iter().any(|l| l.contains("after-removal")));
    }
}
