use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "chanmirror.toml";
pub const DEFAULT_WEBHOOK_NAME: &str = "Chat Exporter Bot";
pub const DEFAULT_PROGRESS_FILE: &str = "progress.json";
pub const DEFAULT_UPLOAD_URL: &str = "https://lewd.host/api/upload";
pub const DEFAULT_ALBUM_ID: &str = "905";

pub const GROUP_SECONDS: u64 = 300;
/// Discord's cap on webhook message content, in characters.
pub const CONTENT_LIMIT: usize = 2000;
pub const REQUEST_DELAY_MS: u64 = 1500;
pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_UNIT_SECS: u64 = 5;
pub const DEFAULT_RETRY_AFTER_SECS: f64 = 5.0;
pub const INLINE_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const HOST_MAX_BYTES: u64 = 512 * 1024 * 1024;
pub const PAGE_SIZE: u8 = 100;

/// Legacy plain environment variables and the keys they populate.
const LEGACY_ENV: [(&str, &str); 4] = [
    ("bot_token", "discord.bot_token"),
    ("source_channel_id", "discord.source_channel_id"),
    ("target_channel_id", "discord.target_channel_id"),
    ("lewdhost_token", "file_host.token"),
];

/// Top-level config (chanmirror.toml + CHANMIRROR_* and legacy env overrides).
///
/// Built once in the binary and handed to every component by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub file_host: FileHostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// `0` means unset.
    #[serde(default)]
    pub source_channel_id: u64,
    #[serde(default)]
    pub target_channel_id: u64,
    /// Name of the webhook looked up (or created) on the target channel.
    #[serde(default = "default_webhook_name")]
    pub webhook_name: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            source_channel_id: 0,
            target_channel_id: 0,
            webhook_name: default_webhook_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Max gap between two messages of one batch.
    #[serde(default = "default_group_seconds")]
    pub group_seconds: u64,
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
    /// Pause after every successful webhook request.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 503 and network failures wait `backoff_unit_secs * attempt`.
    #[serde(default = "default_backoff_unit_secs")]
    pub backoff_unit_secs: u64,
    /// Used when a 429 response carries no readable `retry_after`.
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: f64,
    /// Attachments up to this size are posted straight to the webhook.
    #[serde(default = "default_inline_max_bytes")]
    pub inline_max_bytes: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u8,
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            group_seconds: GROUP_SECONDS,
            content_limit: CONTENT_LIMIT,
            request_delay_ms: REQUEST_DELAY_MS,
            max_attempts: MAX_ATTEMPTS,
            backoff_unit_secs: BACKOFF_UNIT_SECS,
            default_retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            inline_max_bytes: INLINE_MAX_BYTES,
            page_size: PAGE_SIZE,
            progress_path: default_progress_path(),
        }
    }
}

impl ExportConfig {
    pub fn group_gap(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(i64::try_from(self.group_seconds).unwrap_or(i64::MAX))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_secs(self.backoff_unit_secs)
    }
}

/// Third-party host used for attachments too large to post inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHostConfig {
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_album_id")]
    pub album_id: String,
    /// Attachments above this size are skipped without an upload attempt.
    #[serde(default = "default_host_max_bytes")]
    pub max_bytes: u64,
}

impl Default for FileHostConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            token: String::new(),
            album_id: default_album_id(),
            max_bytes: HOST_MAX_BYTES,
        }
    }
}

fn default_webhook_name() -> String {
    DEFAULT_WEBHOOK_NAME.to_string()
}
fn default_group_seconds() -> u64 {
    GROUP_SECONDS
}
fn default_content_limit() -> usize {
    CONTENT_LIMIT
}
fn default_request_delay_ms() -> u64 {
    REQUEST_DELAY_MS
}
fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}
fn default_backoff_unit_secs() -> u64 {
    BACKOFF_UNIT_SECS
}
fn default_retry_after_secs() -> f64 {
    DEFAULT_RETRY_AFTER_SECS
}
fn default_inline_max_bytes() -> u64 {
    INLINE_MAX_BYTES
}
fn default_page_size() -> u8 {
    PAGE_SIZE
}
fn default_progress_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRESS_FILE)
}
fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.to_string()
}
fn default_album_id() -> String {
    DEFAULT_ALBUM_ID.to_string()
}
fn default_host_max_bytes() -> u64 {
    HOST_MAX_BYTES
}

impl MirrorConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence, lowest first:
    ///   1. the TOML file (missing file is fine)
    ///   2. `CHANMIRROR_*` variables, nested keys split on `__`
    ///      (e.g. `CHANMIRROR_EXPORT__GROUP_SECONDS`)
    ///   3. `BOT_TOKEN`, `SOURCE_CHANNEL_ID`, `TARGET_CHANNEL_ID`, `LEWDHOST_TOKEN`
    ///
    /// The result is not validated; call [`MirrorConfig::validate`].
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHANMIRROR_").split("__"))
            .merge(
                Env::raw().filter_map(|key| legacy_key(key.as_str()).map(Into::into)),
            )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| MirrorError::Config(e.to_string()))
    }

    /// Reject a config that lacks any credential or channel id.
    ///
    /// Every missing key is reported, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.discord.bot_token.trim().is_empty() {
            missing.push("discord.bot_token (BOT_TOKEN)".to_string());
        }
        if self.discord.source_channel_id == 0 {
            missing.push("discord.source_channel_id (SOURCE_CHANNEL_ID)".to_string());
        }
        if self.discord.target_channel_id == 0 {
            missing.push("discord.target_channel_id (TARGET_CHANNEL_ID)".to_string());
        }
        if self.file_host.token.trim().is_empty() {
            missing.push("file_host.token (LEWDHOST_TOKEN)".to_string());
        }
        if !missing.is_empty() {
            return Err(MirrorError::MissingConfig(missing));
        }

        if self.export.content_limit == 0 {
            return Err(MirrorError::Config(
                "export.content_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn legacy_key(env_key: &str) -> Option<&'static str> {
    let lower = env_key.to_ascii_lowercase();
    LEGACY_ENV
        .iter()
        .find(|(from, _)| *from == lower)
        .map(|(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> MirrorConfig {
        MirrorConfig::from_figment(Figment::new().merge(Toml::string(toml))).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = from_toml("");
        assert_eq!(cfg.discord.webhook_name, DEFAULT_WEBHOOK_NAME);
        assert_eq!(cfg.export.group_seconds, 300);
        assert_eq!(cfg.export.content_limit, 2000);
        assert_eq!(cfg.export.request_delay(), Duration::from_millis(1500));
        assert_eq!(cfg.export.inline_max_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.file_host.max_bytes, 512 * 1024 * 1024);
        assert_eq!(cfg.file_host.album_id, "905");
        assert_eq!(cfg.export.progress_path, PathBuf::from("progress.json"));
    }

    #[test]
    fn toml_sections_override_defaults() {
        let cfg = from_toml(
            r#"
            [discord]
            bot_token = "abc"
            source_channel_id = 11
            target_channel_id = 22

            [export]
            group_seconds = 60

            [file_host]
            token = "host-secret"
            "#,
        );
        assert_eq!(cfg.discord.bot_token, "abc");
        assert_eq!(cfg.discord.source_channel_id, 11);
        assert_eq!(cfg.export.group_gap(), chrono::TimeDelta::seconds(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_lists_every_missing_key() {
        let cfg = from_toml("[discord]\nbot_token = \"abc\"\n");
        match cfg.validate() {
            Err(MirrorError::MissingConfig(keys)) => {
                assert_eq!(keys.len(), 3);
                assert!(keys[0].contains("SOURCE_CHANNEL_ID"));
                assert!(keys[2].contains("LEWDHOST_TOKEN"));
            }
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }

    #[test]
    fn missing_keys_are_reported_before_bad_values() {
        let cfg = from_toml("[export]\ncontent_limit = 0\n");
        match cfg.validate() {
            Err(MirrorError::MissingConfig(keys)) => assert_eq!(keys.len(), 4),
            other => panic!("expected MissingConfig, got {other:?}"),
        }

        let cfg = from_toml(
            "[discord]\nbot_token = \"abc\"\nsource_channel_id = 1\ntarget_channel_id = 2\n\
             [file_host]\ntoken = \"t\"\n[export]\ncontent_limit = 0\n",
        );
        assert!(matches!(cfg.validate(), Err(MirrorError::Config(_))));
    }

    #[test]
    fn legacy_env_names_map_to_nested_keys() {
        assert_eq!(legacy_key("BOT_TOKEN"), Some("discord.bot_token"));
        assert_eq!(legacy_key("LEWDHOST_TOKEN"), Some("file_host.token"));
        assert_eq!(legacy_key("HOME"), None);
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chanmirror.toml");
        std::fs::write(&path, "[export]\npage_size = 50\n").unwrap();
        let cfg = MirrorConfig::from_figment(Figment::new().merge(Toml::file(&path))).unwrap();
        assert_eq!(cfg.export.page_size, 50);
    }
}
