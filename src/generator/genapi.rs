//! GenAPI 클라이언트 - 원격 생성 서비스 호출
//!
//! 재시도 정책, 결과 태그 유니언(GenOutcome), 응답 형태 정규화를
//! 담당합니다. 이 계층은 절대 Err를 반환하지 않고, 모든 실패를
//! 호출자가 그대로 내보낼 수 있는 라벨 문자열로 수렴시킵니다.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// Retry Policy
// ============================================================================

/// 재시도 정책
///
/// 재시도는 순차적이며 (투기적 병렬 호출 없음), 대기는
/// `tokio::time::sleep`이므로 요청 future가 드롭되면 함께 취소됩니다.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 총 시도 횟수 (재시도 포함)
    pub max_attempts: u32,
    /// 첫 재시도 전 대기
    pub base_delay: Duration,
    /// 재시도마다 대기 배율
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(750),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// n번째 재시도 전 대기 시간 (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.mul_f64(self.multiplier.powi(retry as i32))
    }
}

// ============================================================================
// Outcome Union
// ============================================================================

/// 생성 호출의 태그된 결과
#[derive(Debug, Clone, PartialEq)]
pub enum GenOutcome {
    /// 정상 파싱된 답변 텍스트
    Success(String),
    /// 인증 키 미설정 (네트워크 호출 전 단락)
    MissingCredential,
    /// 재시도 대상 HTTP 오류 (429/5xx)
    TransientHttp { status: u16, body: String },
    /// 즉시 실패하는 HTTP 오류
    FatalHttp { status: u16, body: String },
    /// 전송 계층 오류 (연결 실패 등)
    Transport(String),
    /// 200이지만 본문이 JSON이 아님
    Parse(String),
    /// JSON이지만 알려진 세 형태 중 무엇도 아님
    UnexpectedShape(String),
}

impl GenOutcome {
    /// 재시도 대상 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenOutcome::TransientHttp { .. } | GenOutcome::Transport(_)
        )
    }

    /// 호출자에게 돌려줄 답변 문자열로 변환
    ///
    /// 실패도 진단 가능한 라벨 텍스트가 됩니다. 형태 오류는 원본
    /// 페이로드를 그대로 노출해 디버깅을 돕습니다.
    pub fn into_answer(self) -> String {
        match self {
            GenOutcome::Success(text) => text,
            GenOutcome::MissingCredential => {
                "[GenAPI error] Missing GENAPI_KEY (set env var)".to_string()
            }
            GenOutcome::TransientHttp { status, body }
            | GenOutcome::FatalHttp { status, body } => {
                format!("[GenAPI HTTP {status}] {body}")
            }
            GenOutcome::Transport(message) => format!("[GenAPI exception] {message}"),
            GenOutcome::Parse(message) => format!("[GenAPI parse error] {message}"),
            GenOutcome::UnexpectedShape(raw) => format!("[GenAPI unexpected] {raw}"),
        }
    }
}

// ============================================================================
// Request Body
// ============================================================================

/// GenAPI 요청 본문 (호출당 불변)
#[derive(Debug, Clone, Serialize)]
pub struct GenRequest {
    pub is_sync: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub messages: Vec<GenMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenMessage {
    pub role: &'static str,
    pub content: Vec<GenContent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl GenRequest {
    /// system + user 메시지로 동기 채팅 요청 구성
    pub fn chat(system_prompt: String, user_prompt: String) -> Self {
        Self {
            is_sync: true,
            temperature: 0.0,
            top_p: 0.9,
            messages: vec![
                GenMessage {
                    role: "system",
                    content: vec![GenContent {
                        kind: "text",
                        text: system_prompt,
                    }],
                },
                GenMessage {
                    role: "user",
                    content: vec![GenContent {
                        kind: "text",
                        text: user_prompt,
                    }],
                },
            ],
        }
    }
}

// ============================================================================
// Response Shape Decoding
// ============================================================================

/// 알려진 응답 형태를 우선순위대로 시도해 텍스트 추출
///
/// 1. GenAPI 고유: {"response": [{"message"|"delta": {"content": str}}]}
/// 2. OpenAI 호환: {"choices": [{"message": {"content": str}}]}
/// 3. 평면 키: {"output"|"text"|"message": str}
///
/// 공백뿐인 문자열은 매치로 치지 않고 다음 형태로 넘어갑니다.
pub(crate) fn decode_text(data: &Value) -> Option<String> {
    extract_genapi(data)
        .or_else(|| extract_openai(data))
        .or_else(|| extract_flat(data))
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn extract_genapi(data: &Value) -> Option<String> {
    let first = data.get("response")?.as_array()?.first()?;
    let message = first.get("message").or_else(|| first.get("delta"))?;
    non_blank(message.get("content"))
}

fn extract_openai(data: &Value) -> Option<String> {
    let first = data.get("choices")?.as_array()?.first()?;
    non_blank(first.get("message")?.get("content"))
}

fn extract_flat(data: &Value) -> Option<String> {
    ["output", "text", "message"]
        .iter()
        .find_map(|key| non_blank(data.get(key)))
}

// ============================================================================
// GenApiClient
// ============================================================================

/// 원격 생성 서비스 HTTP 클라이언트
pub struct GenApiClient {
    url: String,
    key: Option<String>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GenApiClient {
    /// 클라이언트 생성
    ///
    /// # Arguments
    /// * `url` - GenAPI 엔드포인트
    /// * `key` - Bearer 토큰 (없으면 호출이 MissingCredential로 단락)
    /// * `timeout` - 시도당 HTTP 타임아웃
    pub fn new(url: String, key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            url,
            key,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// 재시도 정책 교체 (테스트에서 짧은 대기 주입용)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 생성 호출 (재시도 포함)
    ///
    /// 429/5xx/전송 오류는 지수 백오프로 재시도하고, 예산 소진 시
    /// 마지막 결과를 그대로 반환합니다. 그 외에는 첫 결과 반환.
    pub async fn call(&self, request: &GenRequest) -> GenOutcome {
        let Some(key) = self.key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return GenOutcome::MissingCredential;
        };

        let mut last = GenOutcome::Transport("no attempts were made".to_string());

        for attempt in 1..=self.retry.max_attempts {
            let outcome = self.attempt(key, request).await;

            if outcome.is_retryable() && attempt < self.retry.max_attempts {
                let delay = self.retry.delay(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    "GenAPI call failed transiently, retrying in {:?}",
                    delay
                );
                last = outcome;
                tokio::time::sleep(delay).await;
                continue;
            }

            return outcome;
        }

        last
    }

    /// 단일 시도
    async fn attempt(&self, key: &str, request: &GenRequest) -> GenOutcome {
        let response = match self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .bearer_auth(key)
            .json(request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return GenOutcome::Transport(e.to_string()),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return GenOutcome::Transport(e.to_string()),
        };

        match status {
            200 => {
                let data: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(e) => return GenOutcome::Parse(e.to_string()),
                };
                match decode_text(&data) {
                    Some(text) => GenOutcome::Success(text),
                    None => GenOutcome::UnexpectedShape(data.to_string()),
                }
            }
            429 | 500 | 502 | 503 | 504 => GenOutcome::TransientHttp { status, body },
            _ => GenOutcome::FatalHttp {
                status,
                body: compact_json(body),
            },
        }
    }
}

/// JSON이면 압축 직렬화, 아니면 원문 유지
fn compact_json(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => value.to_string(),
        Err(_) => body,
    }
}

// ============================================================================
// Tests
// ============================================================================
