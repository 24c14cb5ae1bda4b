//! 审核配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, ModerationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 批次处理相关
    pub const BATCH_SIZE: usize = 5;
    pub const BATCH_DELAY_MS: u64 = 300;

    // 观察器
    pub const DEBOUNCE_MS: u64 = 500;

    // 本地启发式
    pub const LOCAL_TEXT_MAX_CHARS: usize = 200;
    pub const MIN_IMAGE_DIMENSION: u32 = 100;
    pub const DEFAULT_IMAGE_SAMPLE_RATE: f64 = 0.05;
    pub const IMAGE_LOAD_TIMEOUT_MS: u64 = 3000;
    pub const IMAGE_READY_POLL_MS: u64 = 50;

    // 历史记录
    pub const HISTORY_CAPACITY: usize = 100;
    pub const PREVIEW_MAX_CHARS: usize = 100;

    // 页面提示
    pub const INDICATOR_TTL_MS: u64 = 3000;
    pub const NOTIFICATION_TTL_MS: u64 = 5000;
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

    // 默认后端设置
    pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    // 占位文本
    pub const FILTERED_PLACEHOLDER: &str = "[Content filtered]";
    pub const FILTERED_PLACEHOLDER_PREFIX: &str = "[Content filtered";
    pub const LONG_FORM_NOTICE: &str = "[Content filtered - click to view]";
    pub const BLOCKED_NOTICE: &str = "Content blocked by Socio.io";
    pub const BLUR_OVERLAY_NOTICE: &str = "Content blurred - click to reveal";
    pub const LOCAL_DETECTION_REASON: &str = "local detection";

    // 标记类名
    pub const CLASS_PREFIX: &str = "socio-";
    pub const PROCESSED_CLASS: &str = "socio-processed";
    pub const FILTERED_TEXT_CLASS: &str = "socio-filtered-text";
    pub const ENCRYPTED_CLASS: &str = "socio-encrypted";
    pub const BLUR_WRAPPER_CLASS: &str = "socio-blur-wrapper";
    pub const BLUR_OVERLAY_CLASS: &str = "socio-blur-overlay";
    pub const BLURRED_IMAGE_CLASS: &str = "socio-image-blurred";
    pub const BLOCKED_NOTICE_CLASS: &str = "socio-blocked-image";
    pub const INDICATOR_CLASS: &str = "socio-indicator";
    pub const NOTIFICATION_CLASS: &str = "socio-notification";

    pub const BLUR_FILTER: &str = "blur(20px)";

    // 文本候选元素
    pub const TEXT_TAGS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "span", "a", "label",
        "blockquote", "figcaption", "dt", "dd", "caption", "em", "strong", "b", "i",
    ];

    // 跳过的元素
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "template", "textarea", "head", "meta", "link", "svg",
        "math", "canvas", "iframe", "object", "embed", "code", "pre",
    ];

    // 本地脏话词表（整词、大小写不敏感）
    pub const PROFANITY_WORDS: &[&str] = &[
        "fuck", "fucking", "fucked", "shit", "bitch", "asshole", "bastard", "dick", "cunt",
        "motherfucker", "bullshit",
    ];

    // 图片URL中的明确关键词
    pub const EXPLICIT_IMAGE_KEYWORDS: &[&str] = &[
        "xxx", "porn", "nsfw", "nude", "naked", "explicit", "adult", "sexy",
    ];

    // 已知安全的图片主机
    pub const SAFE_IMAGE_HOSTS: &[&str] = &[
        "wikipedia.org",
        "wikimedia.org",
        "github.com",
        "githubusercontent.com",
        "gravatar.com",
        "w3.org",
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "socio-config.toml",
        ".socio-config.toml",
        "socio-config.json",
        "~/.config/socio/config.toml",
        "/etc/socio/config.toml",
    ];

    // 持久化存储键
    pub const KEY_ENABLED: &str = "enabled";
    pub const KEY_TEXT_FILTERED: &str = "textFiltered";
    pub const KEY_IMAGES_FILTERED: &str = "imagesFiltered";
    pub const KEY_FILTER_HISTORY: &str = "filterHistory";
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时退回默认配置
pub fn load_moderation_config(backend_url: Option<&str>) -> ModerationConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.config_with_backend(backend_url),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            ModerationConfig::default_with_backend(backend_url)
        }
    }
}
