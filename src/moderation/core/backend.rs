//! 分析后端 HTTP 客户端

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::verdict::{self, Verdict};
use crate::moderation::error::{ModerationError, ModerationResult};

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    image_url: &'a str,
    url: &'a str,
}

/// 分析后端客户端
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> ModerationResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ModerationError::ConfigError(format!("后端地址无效 '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModerationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ModerationResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ModerationError::ConfigError(format!("拼接接口地址失败 '{}': {}", path, e)))
    }

    /// 读取响应体：`{error}` 优先，其次是非 2xx 状态码
    async fn read_body(response: Response) -> ModerationResult<Value> {
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) if body.get("error").is_some() => Ok(body),
            Ok(_) | Err(_) if !status.is_success() => {
                Err(ModerationError::BackendError(format!("HTTP {}", status)))
            }
            Ok(body) => Ok(body),
            Err(e) => Err(ModerationError::ParseError(format!("响应不是有效的JSON: {}", e))),
        }
    }

    /// `POST /analyze_text`
    pub async fn analyze_text(&self, text: &str, page_url: &str) -> ModerationResult<Verdict> {
        let response = self
            .client
            .post(self.endpoint("analyze_text")?)
            .json(&TextRequest { text, url: page_url })
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        verdict::from_text_response(body)
    }

    /// `POST /analyze_image`
    pub async fn analyze_image(&self, image_url: &str, page_url: &str) -> ModerationResult<Verdict> {
        let response = self
            .client
            .post(self.endpoint("analyze_image")?)
            .json(&ImageRequest {
                image_url,
                url: page_url,
            })
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        verdict::from_image_response(body)
    }

    /// 存活探测：先 `/ping`，失败后 `/api/status`
    pub async fn ping(&self) -> ModerationResult<Value> {
        let mut last_error = None;

        for path in ["ping", "api/status"] {
            let attempt = async {
                let response = self.client.get(self.endpoint(path)?).send().await?;
                let response = response.error_for_status()?;
                Ok::<Value, ModerationError>(response.json::<Value>().await?)
            };

            match attempt.await {
                Ok(body) => {
                    tracing::info!("后端在线: {}{}", self.base_url, path);
                    return Ok(body);
                }
                Err(e) => {
                    tracing::debug!("探测 {} 失败: {}", path, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ModerationError::NetworkError("后端不可达".to_string())))
    }
}
