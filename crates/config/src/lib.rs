//! 统一配置中心
//!
//! 提供服务端与客户端的配置管理，包括：
//! - 服务监听地址
//! - 实时转发（允许的来源、传输方式、输入提示窗口）
//! - 消息存储后端
//!
//! 加载顺序：内置默认值 → 可选的 `konnect.toml` → `KONNECT_` 前缀的环境变量
//! （嵌套字段用 `__` 分隔，例如 `KONNECT_SERVER__PORT=8080`）。

use std::collections::HashSet;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "konnect.toml";
const ENV_PREFIX: &str = "KONNECT_";
const CLIENT_ENV_PREFIX: &str = "KONNECT_CLIENT_";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 实时转发配置
    pub relay: RelayConfig,
    /// 存储配置
    pub storage: StorageConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10000,
        }
    }
}

/// 实时传输方式，按配置顺序尝试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "long_polling")]
    LongPolling,
}

/// 实时转发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 唯一允许的跨域来源
    pub allowed_origin: String,
    /// 输入中提示的显示窗口（毫秒）
    pub typing_expiry_ms: u64,
    /// 启用的传输方式
    pub transports: Vec<Transport>,
    /// 每个连接的发送队列容量
    pub outbound_buffer: usize,
    /// 长轮询单次等待时长（秒）
    pub long_poll_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "http://localhost:5173".to_string(),
            typing_expiry_ms: 3000,
            transports: vec![Transport::WebSocket, Transport::LongPolling],
            outbound_buffer: 256,
            long_poll_timeout_secs: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl AppConfig {
    /// 从默认位置加载配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// 从指定的 toml 文件（可不存在）和环境变量加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.relay.allowed_origin.trim().is_empty() {
            return Err(ConfigError::InvalidRelayConfig(
                "allowed origin cannot be empty".to_string(),
            ));
        }
        if self.relay.typing_expiry_ms == 0 {
            return Err(ConfigError::InvalidRelayConfig(
                "typing expiry must be greater than 0".to_string(),
            ));
        }
        if self.relay.outbound_buffer == 0 {
            return Err(ConfigError::InvalidRelayConfig(
                "outbound buffer must be greater than 0".to_string(),
            ));
        }
        if self.relay.long_poll_timeout_secs == 0 {
            return Err(ConfigError::InvalidRelayConfig(
                "long poll timeout must be greater than 0".to_string(),
            ));
        }
        validate_transports(&self.relay.transports)?;

        if self.storage.backend == StorageBackend::Postgres {
            let missing = self
                .storage
                .database_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty());
            if missing {
                return Err(ConfigError::InvalidDatabaseUrl(
                    "postgres backend requires a database URL".to_string(),
                ));
            }
            if self.storage.max_connections == 0 {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "max connections must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 服务端基础地址，例如 `http://127.0.0.1:10000`
    pub server_url: String,
    pub transports: Vec<Transport>,
    pub typing_expiry_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:10000".to_string(),
            transports: vec![Transport::WebSocket, Transport::LongPolling],
            typing_expiry_ms: 3000,
        }
    }
}

impl ClientConfig {
    /// 从默认值和 `KONNECT_CLIENT_` 前缀的环境变量加载
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(CLIENT_ENV_PREFIX))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::InvalidClientConfig(
                "server url cannot be empty".to_string(),
            ));
        }
        if self.typing_expiry_ms == 0 {
            return Err(ConfigError::InvalidClientConfig(
                "typing expiry must be greater than 0".to_string(),
            ));
        }
        validate_transports(&self.transports)
    }
}

fn validate_transports(transports: &[Transport]) -> Result<(), ConfigError> {
    if transports.is_empty() {
        return Err(ConfigError::InvalidTransports(
            "at least one transport is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = transports.iter().find(|t| !seen.insert(**t)) {
        return Err(ConfigError::InvalidTransports(format!(
            "transport {duplicate:?} listed more than once"
        )));
    }
    Ok(())
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid relay configuration: {0}")]
    InvalidRelayConfig(String),
    #[error("Invalid transports: {0}")]
    InvalidTransports(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid client configuration: {0}")]
    InvalidClientConfig(String),
}
