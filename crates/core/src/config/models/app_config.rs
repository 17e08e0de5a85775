use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    game::GameConfig, observability::ObservabilityConfig, redis::RedisConfig,
    task_manager::TaskManagerConfig,
};

/// 队列与对局存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    /// 单进程内存后端，用于本地运行和测试
    Memory,
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub redis: RedisConfig,
    pub task_manager: TaskManagerConfig,
    pub game: GameConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis: RedisConfig::default(),
            task_manager: TaskManagerConfig::default(),
            game: GameConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ARENA_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("生成默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/arena.toml", "arena.toml", "/etc/arena/config.toml"];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        // Environment variable overrides, e.g. ARENA_TASK_MANAGER__HOST
        builder = builder.add_source(
            Environment::with_prefix("ARENA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::Redis {
            self.redis.validate().context("Redis配置验证失败")?;
        }

        self.task_manager
            .validate()
            .context("任务管理器配置验证失败")?;

        self.game.validate().context("对局配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.task_manager.poll_interval_ms, 500);
        assert_eq!(config.task_manager.heartbeat_interval_seconds, 5);
        assert_eq!(config.game.min_players, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            backend = "memory"

            [game]
            min_players = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.game.min_players, 4);
        assert_eq!(config.game.health_interval_seconds, 30);
        assert_eq!(config.redis.key_prefix, "arena");
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let mut config = AppConfig::default();
        config.task_manager.poll_interval_ms = 10_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.game.near_distance_meters = 10.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.redis.url = "http://localhost".to_string();
        assert!(config.validate().is_err());
        config.backend = BackendKind::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [redis]
            url = "redis://cache:6379/2"

            [task_manager]
            host = "server-a"
            stop_timeout_seconds = 5
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379/2");
        assert_eq!(config.task_manager.host, "server-a");
        assert_eq!(config.task_manager.stop_timeout_seconds, 5);
        assert_eq!(config.task_manager.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/arena.toml")).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let parsed = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.task_manager.host, config.task_manager.host);
        assert_eq!(parsed.game.catch_distance_meters, 20.0);
    }
}
