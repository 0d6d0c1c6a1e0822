use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use murmur_llm::{BackendConfig, DEFAULT_DELAY_MAX, DEFAULT_DELAY_MIN, SIMULATED_BACKEND_ID};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::chat::attachment::MAX_ATTACHMENT_BYTES;
use crate::chat::input::SOFT_TEXT_LIMIT;
use crate::chat::scroll_manager::DETACH_THRESHOLD;

pub const SETTINGS_DIRECTORY_NAME: &str = "murmur";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "MURMUR_";
pub const DEFAULT_GREETING: &str =
    "Hello! I'm your secure government AI assistant. How can I help you today?";

/// Names accepted by [`SessionSettings::set_field`].
pub const SETTING_FIELDS: [&str; 7] = [
    "backend_id",
    "reply_delay_min_ms",
    "reply_delay_max_ms",
    "max_attachment_bytes",
    "soft_text_limit",
    "detach_threshold",
    "greeting",
];

/// Per-session configuration.
///
/// `greeting` is on by default, so a fresh session opens with one assistant message
/// ahead of anything the user sends. Use [`SessionSettings::without_greeting`] for a
/// log that starts empty, where the first submit yields `[user, composing]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_backend_id")]
    pub backend_id: String,
    #[serde(default = "default_delay_min_ms")]
    pub reply_delay_min_ms: u64,
    #[serde(default = "default_delay_max_ms")]
    pub reply_delay_max_ms: u64,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
    #[serde(default = "default_soft_text_limit")]
    pub soft_text_limit: usize,
    #[serde(default = "default_detach_threshold")]
    pub detach_threshold: f64,
    /// Assistant message seeded at index 0 of a new session. `None` disables it.
    #[serde(default = "default_greeting")]
    pub greeting: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend_id: default_backend_id(),
            reply_delay_min_ms: default_delay_min_ms(),
            reply_delay_max_ms: default_delay_max_ms(),
            max_attachment_bytes: default_max_attachment_bytes(),
            soft_text_limit: default_soft_text_limit(),
            detach_threshold: default_detach_threshold(),
            greeting: default_greeting(),
        }
    }
}

impl SessionSettings {
    pub fn without_greeting(mut self) -> Self {
        self.greeting = None;
        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::new(
            &self.backend_id,
            Duration::from_millis(self.reply_delay_min_ms),
            Duration::from_millis(self.reply_delay_max_ms),
        )
    }

    /// Updates one field from its textual form. `greeting` accepts `off` or `none`
    /// to disable it.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), SettingsError> {
        let value = value.trim();
        match field {
            "backend_id" => self.backend_id = value.to_string(),
            "reply_delay_min_ms" => self.reply_delay_min_ms = parse_field(field, value)?,
            "reply_delay_max_ms" => self.reply_delay_max_ms = parse_field(field, value)?,
            "max_attachment_bytes" => self.max_attachment_bytes = parse_field(field, value)?,
            "soft_text_limit" => self.soft_text_limit = parse_field(field, value)?,
            "detach_threshold" => self.detach_threshold = parse_field(field, value)?,
            "greeting" => {
                self.greeting = match value {
                    "" | "off" | "none" => None,
                    text => Some(text.to_string()),
                }
            }
            _ => {
                return UnknownFieldSnafu {
                    stage: "set-settings-field",
                    field,
                }
                .fail();
            }
        }
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.backend_id = if self.backend_id.trim().is_empty() {
            default_backend_id()
        } else {
            self.backend_id.trim().to_string()
        };

        if self.reply_delay_min_ms > self.reply_delay_max_ms {
            std::mem::swap(&mut self.reply_delay_min_ms, &mut self.reply_delay_max_ms);
        }
        if self.max_attachment_bytes == 0 {
            self.max_attachment_bytes = default_max_attachment_bytes();
        }
        if self.soft_text_limit == 0 {
            self.soft_text_limit = default_soft_text_limit();
        }
        if !self.detach_threshold.is_finite() || self.detach_threshold < 0.0 {
            self.detach_threshold = default_detach_threshold();
        }

        self.greeting = self
            .greeting
            .map(|greeting| greeting.trim().to_string())
            .filter(|greeting| !greeting.is_empty());

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<SessionSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".murmur"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<SessionSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: SessionSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file, then `MURMUR_*` variables. Never fails: anything
    /// unreadable falls back to defaults.
    fn load_from_disk(path: &Path) -> SessionSettings {
        if !path.exists() {
            tracing::info!(path = ?path, "no settings file, using defaults");
        }

        Figment::from(Serialized::defaults(SessionSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX))
            .extract::<SessionSettings>()
            .map(SessionSettings::normalized)
            .unwrap_or_else(|error| {
                tracing::warn!(path = ?path, error = %error, "unreadable settings, using defaults");
                SessionSettings::default()
            })
    }

    fn persist(&self, settings: &SessionSettings) -> Result<(), SettingsError> {
        let bytes = serde_json::to_vec_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;
        replace_file(&self.config_path, &bytes)?;

        tracing::info!(path = ?self.config_path, "settings saved");
        Ok(())
    }
}

/// Writes next to `path` and renames over it, so readers never see a partial file.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-settings-directory",
            path: parent,
        })?;
    }

    let staged = path.with_extension("json.tmp");
    std::fs::write(&staged, bytes).context(WriteFileSnafu {
        stage: "write-staged-settings-file",
        path: &staged,
    })?;
    std::fs::rename(&staged, path).context(RenameTempFileSnafu {
        stage: "swap-in-settings-file",
        from: &staged,
        to: path,
    })
}

fn parse_field<T: FromStr>(field: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().ok().context(InvalidValueSnafu {
        stage: "parse-settings-field",
        field,
        value,
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("unknown setting `{field}` on `{stage}`"))]
    UnknownField { stage: &'static str, field: String },
    #[snafu(display("`{value}` is not a valid value for `{field}` on `{stage}`"))]
    InvalidValue {
        stage: &'static str,
        field: String,
        value: String,
    },
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

fn default_backend_id() -> String {
    SIMULATED_BACKEND_ID.to_string()
}

fn default_delay_min_ms() -> u64 {
    DEFAULT_DELAY_MIN.as_millis() as u64
}

fn default_delay_max_ms() -> u64 {
    DEFAULT_DELAY_MAX.as_millis() as u64
}

fn default_max_attachment_bytes() -> u64 {
    MAX_ATTACHMENT_BYTES
}

fn default_soft_text_limit() -> usize {
    SOFT_TEXT_LIMIT
}

fn default_detach_threshold() -> f64 {
    DETACH_THRESHOLD
}

fn default_greeting() -> Option<String> {
    Some(DEFAULT_GREETING.to_string())
}
