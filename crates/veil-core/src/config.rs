use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 1985;
pub const DEFAULT_BIND: &str = "0.0.0.0";
/// Lifetime of a vault entry (placeholder → original).
pub const DEFAULT_ENTRY_TTL_SECS: u64 = 3600;
/// Lifetime of a HUMAN session-status key. After this lapses the session
/// falls back to AI handling.
pub const DEFAULT_STATUS_TTL_SECS: u64 = 86_400;
/// Upper bound on a single model turn, stream consumption included.
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;

/// Top-level config (veil.toml + VEIL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            vault: VaultConfig::default(),
            detector: DetectorConfig::default(),
            assistant: AssistantConfig::default(),
            operator: OperatorConfig::default(),
            database: DatabaseConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
        }
    }
}

/// PII store (Redis). When `host` is unset the gateway falls back to an
/// in-process store — development only, entries die with the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub host: Option<String>,
    #[serde(default = "default_vault_port")]
    pub port: u16,
    #[serde(default = "default_entry_ttl")]
    pub entry_ttl_secs: u64,
    #[serde(default = "default_status_ttl")]
    pub status_ttl_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_vault_port(),
            entry_ttl_secs: DEFAULT_ENTRY_TTL_SECS,
            status_ttl_secs: DEFAULT_STATUS_TTL_SECS,
        }
    }
}

/// Entity-detector inference service. When `url` is unset only the regex
/// phase of the scanner runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub url: Option<String>,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            score_threshold: default_score_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub api_key: String,
    /// Conversation-template id on the LLM backend.
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default = "default_assistant_base_url")]
    pub base_url: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            assistant_id: String::new(),
            base_url: default_assistant_base_url(),
        }
    }
}

/// Operator chat surface: one-way escalation webhook plus the bot-framework
/// credentials used for proactive delivery into operator conversations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperatorConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// When false every /admin route returns 403.
    #[serde(default)]
    pub enabled: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_turn_timeout() -> u64 {
    DEFAULT_TURN_TIMEOUT_SECS
}
fn default_vault_port() -> u16 {
    6379
}
fn default_entry_ttl() -> u64 {
    DEFAULT_ENTRY_TTL_SECS
}
fn default_status_ttl() -> u64 {
    DEFAULT_STATUS_TTL_SECS
}
fn default_score_threshold() -> f32 {
    0.7
}
fn default_assistant_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.veil/training_hub.db", home)
}

impl VeilConfig {
    /// Load config from a TOML file with VEIL_* env var overrides.
    ///
    /// Env keys use `__` as the section separator so multi-word fields stay
    /// addressable: `VEIL_ASSISTANT__API_KEY` → `assistant.api_key`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.veil/veil.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VeilConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VEIL_").split("__"))
            .extract()
            .map_err(|e| crate::error::GatewayError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.veil/veil.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = VeilConfig::default();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.vault.port, 6379);
        assert_eq!(config.vault.entry_ttl_secs, 3600);
        assert_eq!(config.vault.status_ttl_secs, 86_400);
        assert!((config.detector.score_threshold - 0.7).abs() < f32::EPSILON);
        assert!(!config.admin.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        // Figment treats a missing TOML file as an empty provider.
        let config = VeilConfig::load(Some("/nonexistent/veil.toml")).unwrap();
        assert_eq!(config.gateway.bind, DEFAULT_BIND);
        assert!(config.vault.host.is_none());
    }
}
