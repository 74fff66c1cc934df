//! Multi-tier TOML configuration for Keel.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use keel_media::{CompressOptions, MAX_UPLOAD_BYTES, UploadGuard};
use keel_session::PolicyConfig;
use keel_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolved configuration for the Keel core.
#[derive(Debug, Clone)]
pub struct KeelConfig {
    pub config_dir: PathBuf,
    pub policy: PolicyConfig,
    pub compression: CompressOptions,
    pub max_upload_bytes: u64,
    providers: BTreeMap<String, ResolvedProvider>,
}

#[derive(Debug, Clone)]
struct ResolvedProvider {
    api_key: Option<String>,
    policy: PolicyConfig,
    max_upload_bytes: u64,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// `[storage]` section: session eviction limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    pub max_sessions: Option<usize>,
    pub soft_limit_ratio: Option<f64>,
    pub cleanup_target_ratio: Option<f64>,
    pub storage_threshold_bytes: Option<ByteLimit>,
}

/// `[media]` section: attachment compression and upload ceiling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSettings {
    pub max_dimension: Option<u32>,
    pub quality: Option<f32>,
    pub max_upload_bytes: Option<u64>,
}

/// `[providers.<name>]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// One credential, or several separated by commas.
    pub api_key: Option<String>,
    pub max_upload_bytes: Option<u64>,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// A byte count, or `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteLimit {
    Bytes(u64),
    Keyword(Unlimited),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unlimited {
    Unlimited,
}

impl ByteLimit {
    fn bytes(self) -> Option<u64> {
        match self {
            ByteLimit::Bytes(n) => Some(n),
            ByteLimit::Keyword(Unlimited::Unlimited) => None,
        }
    }
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_sessions: Option<usize>,
    pub max_dimension: Option<u32>,
    pub quality: Option<f32>,
}

impl KeelConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.keel/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(config_dir, settings, overrides, |key| std::env::var(key).ok())
    }

    /// Resolve settings against overrides and an environment lookup.
    pub fn resolve(
        config_dir: PathBuf,
        settings: SettingsFile,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Env and CLI storage values, applied over every file-level section.
        let mut forced = StorageSettings::default();
        if let Some(value) = env("KEEL_MAX_SESSIONS") {
            forced.max_sessions = Some(parse_env("KEEL_MAX_SESSIONS", &value)?);
        }
        if let Some(value) = env("KEEL_STORAGE_THRESHOLD_BYTES") {
            forced.storage_threshold_bytes = Some(parse_byte_limit(&value)?);
        }
        if let Some(max_sessions) = overrides.max_sessions {
            forced.max_sessions = Some(max_sessions);
        }
        let policy = resolve_policy(&[&settings.storage, &forced])?;

        let compression = CompressOptions {
            max_dimension: overrides
                .max_dimension
                .or(settings.media.max_dimension)
                .unwrap_or(keel_media::DEFAULT_MAX_DIMENSION),
            quality: overrides
                .quality
                .or(settings.media.quality)
                .unwrap_or(keel_media::DEFAULT_QUALITY),
        };
        compression
            .validate()
            .map_err(|e| ConfigError::invalid("media", e.to_string()))?;

        let max_upload_bytes = settings.media.max_upload_bytes.unwrap_or(MAX_UPLOAD_BYTES);

        let mut providers = BTreeMap::new();
        for (name, provider) in settings.providers {
            let resolved = ResolvedProvider {
                api_key: env(&api_key_var(&name)).or(provider.api_key),
                policy: resolve_policy(&[&settings.storage, &provider.storage, &forced])?,
                max_upload_bytes: provider.max_upload_bytes.unwrap_or(max_upload_bytes),
            };
            providers.insert(name, resolved);
        }

        Ok(KeelConfig {
            config_dir,
            policy,
            compression,
            max_upload_bytes,
            providers,
        })
    }

    /// Eviction policy for `provider`, falling back to the global one.
    pub fn policy_for(&self, provider: Option<&str>) -> PolicyConfig {
        self.provider(provider)
            .map(|p| p.policy)
            .unwrap_or(self.policy)
    }

    /// Upload ceiling for `provider`, falling back to the global one.
    pub fn upload_guard(&self, provider: Option<&str>) -> UploadGuard {
        let max_bytes = self
            .provider(provider)
            .map(|p| p.max_upload_bytes)
            .unwrap_or(self.max_upload_bytes);
        UploadGuard::new(max_bytes)
    }

    /// Raw credential field for `provider`, possibly comma-separated.
    ///
    /// `KEEL_<PROVIDER>_API_KEY` is honored even for providers that have
    /// no section in the config file.
    pub fn credential_field(&self, provider: &str) -> Result<String, ConfigError> {
        self.credential_field_with(provider, |key| std::env::var(key).ok())
    }

    fn credential_field_with(
        &self,
        provider: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| env(&api_key_var(provider)))
            .ok_or_else(|| ConfigError::MissingKey {
                key: format!(
                    "api_key for provider '{provider}' (set {} or add [providers.{provider}] to ~/.keel/config.toml)",
                    api_key_var(provider)
                ),
            })
    }

    fn provider(&self, provider: Option<&str>) -> Option<&ResolvedProvider> {
        provider.and_then(|name| self.providers.get(name))
    }
}

/// Layer `layers` over the defaults, later layers winning, and validate
/// the result.
fn resolve_policy(layers: &[&StorageSettings]) -> Result<PolicyConfig, ConfigError> {
    let mut policy = PolicyConfig::default();
    for storage in layers {
        if let Some(max_sessions) = storage.max_sessions {
            policy.max_sessions = max_sessions;
        }
        if let Some(ratio) = storage.soft_limit_ratio {
            policy.soft_limit_ratio = ratio;
        }
        if let Some(ratio) = storage.cleanup_target_ratio {
            policy.cleanup_target_ratio = ratio;
        }
        if let Some(limit) = storage.storage_threshold_bytes {
            policy.storage_threshold_bytes = limit.bytes();
        }
    }
    policy.validate()?;
    Ok(policy)
}

fn api_key_var(provider: &str) -> String {
    let name: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("KEEL_{name}_API_KEY")
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{value}': {e}")))
}

fn parse_byte_limit(value: &str) -> Result<ByteLimit, ConfigError> {
    if value.trim().eq_ignore_ascii_case("unlimited") {
        return Ok(ByteLimit::Keyword(Unlimited::Unlimited));
    }
    parse_env("KEEL_STORAGE_THRESHOLD_BYTES", value).map(ByteLimit::Bytes)
}

/// Get the Keel config directory path (~/.keel/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KEEL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".keel")
}

/// Load and parse a TOML settings file. A missing file yields defaults.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(e) => {
            tracing::debug!("No settings at {}: {}", path.display(), e);
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(toml_str: &str, env: &[(&str, &str)]) -> Result<KeelConfig, ConfigError> {
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KeelConfig::resolve(
            PathBuf::from("/tmp/keel"),
            settings,
            CliOverrides::default(),
            |key| env.get(key).cloned(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = resolve("", &[]).unwrap();
        assert_eq!(config.policy, PolicyConfig::default());
        assert_eq!(config.compression, CompressOptions::default());
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_storage_section() {
        let config = resolve(
            r#"
[storage]
max_sessions = 50
soft_limit_ratio = 1.0
cleanup_target_ratio = 0.5
storage_threshold_bytes = 4096
"#,
            &[],
        )
        .unwrap();
        assert_eq!(config.policy.max_sessions, 50);
        assert_eq!(config.policy.cleanup_target_ratio, 0.5);
        assert_eq!(config.policy.storage_threshold_bytes, Some(4096));
    }

    #[test]
    fn test_unlimited_threshold() {
        let config = resolve(
            r#"
[storage]
storage_threshold_bytes = "unlimited"
"#,
            &[],
        )
        .unwrap();
        assert_eq!(config.policy.storage_threshold_bytes, None);
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let result = resolve(
            r#"
[storage]
soft_limit_ratio = 0.5
cleanup_target_ratio = 0.8
"#,
            &[],
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let result = resolve("[media]\nquality = 2.0\n", &[]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = resolve(
            "[storage]\nmax_sessions = 50\n",
            &[
                ("KEEL_MAX_SESSIONS", "20"),
                ("KEEL_STORAGE_THRESHOLD_BYTES", "unlimited"),
            ],
        )
        .unwrap();
        assert_eq!(config.policy.max_sessions, 20);
        assert_eq!(config.policy.storage_threshold_bytes, None);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let result = resolve("", &[("KEEL_MAX_SESSIONS", "lots")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_cli_overrides_env() {
        let settings = SettingsFile::default();
        let config = KeelConfig::resolve(
            PathBuf::from("/tmp/keel"),
            settings,
            CliOverrides {
                max_sessions: Some(7),
                max_dimension: Some(256),
                quality: Some(0.5),
            },
            |key| (key == "KEEL_MAX_SESSIONS").then(|| "20".to_string()),
        )
        .unwrap();
        assert_eq!(config.policy.max_sessions, 7);
        assert_eq!(config.compression.max_dimension, 256);
    }

    #[test]
    fn test_provider_overrides() {
        let config = resolve(
            r#"
[media]
max_upload_bytes = 1000

[providers.openai]
api_key = "sk-a, sk-b"
max_upload_bytes = 500

[providers.openai.storage]
max_sessions = 10
"#,
            &[],
        )
        .unwrap();

        assert_eq!(config.upload_guard(Some("openai")).max_bytes(), 500);
        assert_eq!(config.upload_guard(Some("other")).max_bytes(), 1000);
        assert_eq!(config.upload_guard(None).max_bytes(), 1000);

        assert_eq!(config.policy_for(Some("openai")).max_sessions, 10);
        // Unset provider fields inherit the global policy.
        assert_eq!(
            config.policy_for(Some("openai")).soft_limit_ratio,
            config.policy.soft_limit_ratio
        );
        assert_eq!(config.policy_for(None), config.policy);

        let field = config.credential_field_with("openai", |_| None).unwrap();
        assert_eq!(field, "sk-a, sk-b");
    }

    #[test]
    fn test_cli_beats_provider_file_value() {
        let settings: SettingsFile = toml::from_str(
            r#"
[storage]
max_sessions = 80

[providers.openai.storage]
max_sessions = 50
storage_threshold_bytes = 4096
"#,
        )
        .unwrap();
        let config = KeelConfig::resolve(
            PathBuf::from("/tmp/keel"),
            settings,
            CliOverrides {
                max_sessions: Some(7),
                ..CliOverrides::default()
            },
            |key| (key == "KEEL_STORAGE_THRESHOLD_BYTES").then(|| "unlimited".to_string()),
        )
        .unwrap();

        assert_eq!(config.policy.max_sessions, 7);
        assert_eq!(config.policy_for(Some("openai")).max_sessions, 7);
        assert_eq!(config.policy_for(Some("openai")).storage_threshold_bytes, None);
    }

    #[test]
    fn test_env_beats_provider_file_value() {
        let config = resolve(
            "[providers.openai.storage]\nmax_sessions = 50\n",
            &[("KEEL_MAX_SESSIONS", "20")],
        )
        .unwrap();
        assert_eq!(config.policy_for(Some("openai")).max_sessions, 20);
    }

    #[test]
    fn test_provider_file_beats_global_file() {
        let config = resolve(
            r#"
[storage]
max_sessions = 80
cleanup_target_ratio = 0.5

[providers.openai.storage]
max_sessions = 50
"#,
            &[],
        )
        .unwrap();
        let openai = config.policy_for(Some("openai"));
        assert_eq!(openai.max_sessions, 50);
        assert_eq!(openai.cleanup_target_ratio, 0.5);
        assert_eq!(config.policy.max_sessions, 80);
    }

    #[test]
    fn test_provider_api_key_from_env() {
        let config = resolve(
            "[providers.open-ai]\n",
            &[("KEEL_OPEN_AI_API_KEY", "env-key")],
        )
        .unwrap();
        assert_eq!(
            config.credential_field_with("open-ai", |_| None).unwrap(),
            "env-key"
        );
    }

    #[test]
    fn test_credential_field_env_fallback_and_missing() {
        let config = resolve("", &[]).unwrap();
        let field = config
            .credential_field_with("gemini", |key| {
                (key == "KEEL_GEMINI_API_KEY").then(|| "g1,g2".to_string())
            })
            .unwrap();
        assert_eq!(field, "g1,g2");

        let missing = config.credential_field_with("gemini", |_| None);
        assert!(matches!(missing, Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn test_load_settings_file_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\nmax_sessions = ").unwrap();
        assert!(matches!(
            load_settings_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_settings_file_missing_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = load_settings_file(&dir.path().join("absent.toml")).unwrap();
        assert!(settings.storage.max_sessions.is_none());
        assert!(settings.providers.is_empty());
    }
}
