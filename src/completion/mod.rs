//! 완성(Completion) 모듈 - 조립된 프롬프트로 답변 생성
//!
//! OpenAI 호환 `/completions` 엔드포인트를 호출합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::embedding::{build_client, describe_api_error};

/// 완성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트에 대한 생성 텍스트 (가공하지 않은 원문)
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    fn name(&self) -> &str;
}

/// OpenAI 호환 완성 구현체
#[derive(Debug, Clone)]
pub struct OpenAiCompletion {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing completion model name");

        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: format!("{}/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(
            config.require_api_key()?,
            &config.base_url,
            &config.completion_model,
            config.request_timeout,
        )
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

fn parse_completion(body: &str) -> Result<String> {
    let response: CompletionResponse =
        serde_json::from_str(body).context("Failed to parse completion response")?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text)
        .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(describe_api_error(status, &body));
        }

        parse_completion(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
