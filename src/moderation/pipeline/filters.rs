//! 本地启发式过滤器
//!
//! 后端不可用或文本很短时使用的占位启发式：整词脏话匹配，以及基于图片地址、
//! 尺寸和随机抽样的图片判断。

use rand::Rng;
use regex::Regex;
use url::Url;

use crate::moderation::config::{constants, ModerationConfig};
use crate::moderation::error::{ModerationError, ModerationResult};

/// 整词、大小写不敏感的脏话过滤器
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    pattern: Regex,
    max_chars: usize,
}

impl ProfanityFilter {
    pub fn new(words: &[&str], max_chars: usize) -> ModerationResult<Self> {
        if words.is_empty() {
            return Err(ModerationError::ConfigError("脏话词表为空".to_string()));
        }

        let alternation = words
            .iter()
            .map(|word| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
            .map_err(|e| ModerationError::ConfigError(format!("脏话正则无效: {}", e)))?;

        Ok(Self { pattern, max_chars })
    }

    /// 使用内置词表
    pub fn with_defaults(max_chars: usize) -> ModerationResult<Self> {
        Self::new(constants::PROFANITY_WORDS, max_chars)
    }

    /// 文本是否适用本地过滤（长文本豁免）
    pub fn applies_to(&self, text: &str) -> bool {
        text.chars().count() <= self.max_chars
    }

    /// 返回第一个命中的词
    pub fn find(&self, text: &str) -> Option<String> {
        if !self.applies_to(text) {
            return None;
        }
        self.pattern
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// 图片启发式判断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDecision {
    Keep,
    Blur(String),
}

/// 基于地址和尺寸的图片启发式
#[derive(Debug, Clone)]
pub struct ImageHeuristic {
    keywords: Vec<String>,
    safe_hosts: Vec<String>,
    min_dimension: u32,
    sample_rate: f64,
}

impl ImageHeuristic {
    pub fn new(min_dimension: u32, sample_rate: f64) -> Self {
        Self {
            keywords: constants::EXPLICIT_IMAGE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            safe_hosts: constants::SAFE_IMAGE_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            min_dimension,
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.min_image_dimension, config.image_sample_rate)
    }

    pub fn evaluate(&self, image_url: &str, dimensions: Option<(u32, u32)>) -> ImageDecision {
        self.evaluate_with(image_url, dimensions, &mut rand::thread_rng())
    }

    /// 依次判断：明确关键词 → 安全主机 → 小图豁免 → 随机抽样
    pub fn evaluate_with<R: Rng>(
        &self,
        image_url: &str,
        dimensions: Option<(u32, u32)>,
        rng: &mut R,
    ) -> ImageDecision {
        let lowered = image_url.to_lowercase();
        if let Some(keyword) = self.keywords.iter().find(|k| lowered.contains(k.as_str())) {
            return ImageDecision::Blur(format!("explicit keyword in URL: {}", keyword));
        }

        if self.is_safe_host(image_url) {
            return ImageDecision::Keep;
        }

        if let Some((width, height)) = dimensions {
            if width < self.min_dimension || height < self.min_dimension {
                return ImageDecision::Keep;
            }
        }

        if self.sample_rate > 0.0 && rng.gen_bool(self.sample_rate) {
            return ImageDecision::Blur("random sample".to_string());
        }

        ImageDecision::Keep
    }

    fn is_safe_host(&self, image_url: &str) -> bool {
        let Ok(parsed) = Url::parse(image_url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };

        self.safe_hosts
            .iter()
            .any(|safe| host == safe || host.ends_with(&format!(".{}", safe)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profanity_matches_whole_words_only() {
        let filter = ProfanityFilter::with_defaults(200).unwrap();

        assert_eq!(
            filter.find("What the FUCKING hell is this"),
            Some("fucking".to_string())
        );
        assert!(filter.is_match("oh shit."));
        assert!(!filter.is_match("this is fine"));
        assert!(!filter.is_match("Scunthorpe and dickens"));
    }

    #[test]
    fn test_long_text_is_exempt() {
        let filter = ProfanityFilter::with_defaults(200).unwrap();
        let long = format!("{} shit", "a".repeat(250));

        assert!(!filter.applies_to(&long));
        assert!(!filter.is_match(&long));
    }

    #[test]
    fn test_image_keyword_wins_over_safe_host() {
        let heuristic = ImageHeuristic::new(100, 0.0);

        assert!(matches!(
            heuristic.evaluate("https://upload.wikimedia.org/xxx.jpg", None),
            ImageDecision::Blur(_)
        ));
        assert_eq!(
            heuristic.evaluate("https://upload.wikimedia.org/cat.jpg", None),
            ImageDecision::Keep
        );
    }

    #[test]
    fn test_small_images_are_exempt_from_sampling() {
        let heuristic = ImageHeuristic::new(100, 1.0);

        assert_eq!(
            heuristic.evaluate("https://cdn.example.com/icon.png", Some((32, 32))),
            ImageDecision::Keep
        );
        assert!(matches!(
            heuristic.evaluate("https://cdn.example.com/photo.png", Some((800, 600))),
            ImageDecision::Blur(_)
        ));
    }

    #[test]
    fn test_zero_sample_rate_keeps_unknown_images() {
        let heuristic = ImageHeuristic::new(100, 0.0);
        assert_eq!(
            heuristic.evaluate("https://cdn.example.com/photo.png", None),
            ImageDecision::Keep
        );
    }
}
