//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::moderation::error::{ModerationError, ModerationResult};

/// 审核管道配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModerationConfig {
    // 基础配置
    pub enabled: bool,
    pub backend_url: String,
    pub request_timeout_secs: u64,

    // 批次配置
    pub batch_size: usize,
    pub batch_delay_ms: u64,

    // 观察器配置
    pub debounce_ms: u64,
    pub observe_character_data: bool,

    // 启发式配置
    pub local_text_max_chars: usize,
    pub image_fallback: bool,
    pub image_sample_rate: f64,
    pub min_image_dimension: u32,
    pub image_load_timeout_ms: u64,

    // 历史与提示
    pub history_capacity: usize,
    pub indicator_ttl_ms: u64,
    pub notification_ttl_ms: u64,

    // 持久化
    pub store_path: Option<String>,
}

impl ModerationConfig {
    /// 创建带指定后端地址的默认配置
    pub fn default_with_backend(backend_url: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(url) = backend_url {
            config.backend_url = url.to_string();
        }
        config
    }

    /// 验证配置
    pub fn validate(&self) -> ModerationResult<()> {
        if self.batch_size == 0 {
            return Err(ModerationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(ModerationError::ConfigError("请求超时不能为0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.image_sample_rate) {
            return Err(ModerationError::ConfigError(format!(
                "图片抽样率必须在0到1之间: {}",
                self.image_sample_rate
            )));
        }

        if self.history_capacity == 0 {
            return Err(ModerationError::ConfigError("历史记录容量不能为0".to_string()));
        }

        url::Url::parse(&self.backend_url).map_err(|e| {
            ModerationError::ConfigError(format!("后端地址无效 '{}': {}", self.backend_url, e))
        })?;

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{core, moderation, EnvVar};

        if let Ok(enabled) = moderation::Enabled::get() {
            self.enabled = enabled;
        }

        if std::env::var(moderation::BackendUrl::NAME).is_ok() {
            match moderation::BackendUrl::get() {
                Ok(url) => {
                    self.backend_url = url;
                    tracing::info!("环境变量覆盖后端地址: {}", self.backend_url);
                }
                Err(e) => tracing::warn!("忽略无效的环境变量: {}", e),
            }
        }

        if let Ok(batch_size) = moderation::BatchSize::get() {
            self.batch_size = batch_size;
        }

        if let Ok(delay) = moderation::BatchDelay::get() {
            self.batch_delay_ms = delay.as_millis() as u64;
        }

        if let Ok(debounce) = moderation::Debounce::get() {
            self.debounce_ms = debounce.as_millis() as u64;
        }

        if let Ok(timeout) = moderation::RequestTimeout::get() {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Ok(rate) = moderation::ImageSampleRate::get() {
            self.image_sample_rate = rate;
        }

        if let Ok(fallback) = moderation::ImageFallback::get() {
            self.image_fallback = fallback;
        }

        if let Ok(path) = core::StorePath::get() {
            self.store_path = Some(path);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn image_load_timeout(&self) -> Duration {
        Duration::from_millis(self.image_load_timeout_ms)
    }

    pub fn indicator_ttl(&self) -> Duration {
        Duration::from_millis(self.indicator_ttl_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend_url: constants::DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),

            batch_size: constants::BATCH_SIZE,
            batch_delay_ms: constants::BATCH_DELAY_MS,

            debounce_ms: constants::DEBOUNCE_MS,
            observe_character_data: false,

            local_text_max_chars: constants::LOCAL_TEXT_MAX_CHARS,
            image_fallback: true,
            image_sample_rate: constants::DEFAULT_IMAGE_SAMPLE_RATE,
            min_image_dimension: constants::MIN_IMAGE_DIMENSION,
            image_load_timeout_ms: constants::IMAGE_LOAD_TIMEOUT_MS,

            history_capacity: constants::HISTORY_CAPACITY,
            indicator_ttl_ms: constants::INDICATOR_TTL_MS,
            notification_ttl_ms: constants::NOTIFICATION_TTL_MS,

            store_path: None,
        }
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: ModerationConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器：配置文件 → .env → 环境变量 → 校验
    pub fn new() -> ModerationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(path: &str) -> ModerationResult<Self> {
        Self::load_dotenv();
        let expanded = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &ModerationConfig {
        &self.config
    }

    /// 获取配置，可选地替换后端地址
    pub fn config_with_backend(&self, backend_url: Option<&str>) -> ModerationConfig {
        let mut config = self.config.clone();
        if let Some(url) = backend_url {
            config.backend_url = url.to_string();
        }
        config
    }

    fn load_config() -> ModerationResult<ModerationConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(ModerationConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &str) -> ModerationResult<ModerationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModerationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| ModerationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| ModerationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> ModerationResult<()> {
        let config = ModerationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| ModerationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ModerationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
