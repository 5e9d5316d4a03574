use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use contextlink_api::DEFAULT_MODEL;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const SETTINGS_DIRECTORY_NAME: &str = "contextlink";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CONTEXTLINK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            default_model: default_model(),
            log_level: default_log_level(),
        }
    }
}

impl ClientSettings {
    /// Trims every field and replaces blanks with the defaults.
    pub fn normalized(mut self) -> Self {
        self.api_base_url = non_blank_or(&self.api_base_url, default_api_base_url);
        self.default_model = non_blank_or(&self.default_model, default_model);
        self.log_level = non_blank_or(&self.log_level, default_log_level).to_ascii_lowercase();
        self
    }
}

/// Client settings loaded once at startup and swapped in place on change.
///
/// Reads layer defaults, the JSON file and the override figment (the
/// `CONTEXTLINK_*` environment unless built with [`SettingsStore::with_overrides`]).
/// Writes only ever contain the defaults-plus-file layers, so overrides stay
/// scoped to the process that set them.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
    overrides: Figment,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".contextlink"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Store backed by `config_path` with `CONTEXTLINK_*` environment overrides.
    pub fn new(config_path: PathBuf) -> Self {
        Self::with_overrides(config_path, Figment::from(Env::prefixed(ENV_PREFIX)))
    }

    /// Store whose top layer comes from `overrides` instead of the process environment.
    pub fn with_overrides(config_path: PathBuf, overrides: Figment) -> Self {
        let settings = Self::load_from_disk(&config_path, &overrides);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
            overrides,
        }
    }

    /// Store at [`SettingsStore::default_config_path`].
    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Snapshot of the effective settings, overrides included.
    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Persists `settings` as given and makes them the effective settings.
    pub fn update(&self, settings: ClientSettings) -> SettingsResult<()> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Remembers the model picked in the selector as the default for new sessions.
    ///
    /// Only `default_model` changes on disk; override values in effect for this
    /// process are never written back to the file.
    pub fn remember_default_model(&self, model_name: &str) -> SettingsResult<()> {
        let model_name = model_name.trim();
        let current = self.settings();
        if current.default_model == model_name {
            return Ok(());
        }

        let mut on_disk = Self::load_file_layer(&self.config_path);
        on_disk.default_model = model_name.to_string();
        self.persist(&on_disk.normalized())?;

        let mut effective = ClientSettings::clone(&current);
        effective.default_model = model_name.to_string();
        self.settings.store(Arc::new(effective.normalized()));
        Ok(())
    }

    fn load_from_disk(path: &Path, overrides: &Figment) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        // Missing files are skipped by the JSON provider; overrides win over both.
        let figment = Self::file_figment(path).merge(overrides.clone());
        Self::extract_or_default(path, figment)
    }

    fn load_file_layer(path: &Path) -> ClientSettings {
        Self::extract_or_default(path, Self::file_figment(path))
    }

    fn file_figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ClientSettings::default())).merge(Json::file(path))
    }

    fn extract_or_default(path: &Path, figment: Figment) -> ClientSettings {
        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ClientSettings) -> SettingsResult<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn non_blank_or(value: &str, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json"));

        let settings = store.settings();
        assert_eq!(settings.default_model, "gpt-4");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn partial_file_is_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"default_model": " claude-3-haiku "}"#).unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.default_model, "claude-3-haiku");
        assert!(!settings.log_level.is_empty());
    }

    #[test]
    fn remembered_model_persists_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        store.remember_default_model("gemini-pro").unwrap();
        assert_eq!(store.settings().default_model, "gemini-pro");
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().default_model, "gemini-pro");
    }

    #[test]
    fn remembered_model_keeps_overrides_out_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"log_level": "debug"}"#).unwrap();
        let overrides = Figment::from(Serialized::default("api_base_url", "http://staging:9000"));
        let store = SettingsStore::with_overrides(path.clone(), overrides);
        assert_eq!(store.settings().api_base_url, "http://staging:9000");

        store.remember_default_model("gemini-pro").unwrap();
        assert_eq!(store.settings().api_base_url, "http://staging:9000");
        assert_eq!(store.settings().default_model, "gemini-pro");

        let written: ClientSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(written.log_level, "debug");
        assert_eq!(written.default_model, "gemini-pro");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();

        assert_eq!(*SettingsStore::new(path).settings(), ClientSettings::default());
    }
}
