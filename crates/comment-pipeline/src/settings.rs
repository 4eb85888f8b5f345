//! Persistent user settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::filter::FilterSettings;
use crate::relay::RelayConfig;
use crate::speech::SpeechSettings;

/// Everything the user configures for the comment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentSettings {
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub filter: FilterSettings,
}

/// JSON-file backed settings published through a watch channel.
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<CommentSettings>,
}

impl SettingsStore {
    /// Load settings from `path`, writing the defaults if the file is missing.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<CommentSettings>(&raw)
                .map_err(|e| PipelineError::settings(&path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Settings file missing, using defaults");
                let settings = CommentSettings::default();
                persist(&path, &settings).await?;
                settings
            }
            Err(e) => return Err(PipelineError::settings(&path, e)),
        };
        let (tx, _) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings.
    pub fn get(&self) -> CommentSettings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CommentSettings> {
        self.tx.subscribe()
    }

    /// Apply `f`, persist the result and publish it.
    pub async fn update(&self, f: impl FnOnce(&mut CommentSettings)) -> Result<CommentSettings> {
        let mut settings = self.get();
        f(&mut settings);
        self.replace(settings).await
    }

    /// Restore the defaults.
    pub async fn reset(&self) -> Result<CommentSettings> {
        self.replace(CommentSettings::default()).await
    }

    async fn replace(&self, settings: CommentSettings) -> Result<CommentSettings> {
        persist(&self.path, &settings).await?;
        self.tx.send_replace(settings.clone());
        debug!(path = %self.path.display(), "Settings updated");
        Ok(settings)
    }
}

/// Write `settings` next to `path` and rename it into place.
async fn persist(path: &Path, settings: &CommentSettings) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::settings(path, e))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| PipelineError::settings(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| PipelineError::settings(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::load(&path).await.unwrap();
        assert_eq!(store.get(), CommentSettings::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_update_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load(&path).await.unwrap();
        let mut rx = store.subscribe();

        store
            .update(|s| {
                s.relay.method = "PUT".to_string();
                s.speech.max_length = 20;
            })
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().relay.method, "PUT");
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get().speech.max_length, 20);

        store.reset().await.unwrap();
        assert_eq!(store.get(), CommentSettings::default());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, r#"{"relay": {"method": "GET", "url": "http://x/{comment}"}}"#)
            .await
            .unwrap();

        let settings = SettingsStore::load(&path).await.unwrap().get();
        assert_eq!(settings.relay.method, "GET");
        assert!(settings.speech.enabled);
        assert_eq!(settings.speech.max_length, 60);
    }

    #[tokio::test]
    async fn test_invalid_file_is_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(matches!(
            SettingsStore::load(&path).await,
            Err(PipelineError::Settings { .. })
        ));
    }
}
