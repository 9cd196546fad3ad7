//! 생성 오케스트레이터 - 프롬프트 구성, 원격 호출, 열화 처리
//!
//! `ask()`는 호출자에게 절대 오류를 올리지 않습니다. 모든 생성 경로
//! 실패는 라벨 문자열 또는 폴백 답변으로 수렴하며, HTTP 경계가
//! 업스트림 불안정 때문에 500을 내는 일이 없도록 설계되어 있습니다.

mod fallback;
mod genapi;
mod postprocess;

use anyhow::Result;

use crate::config::Settings;
use crate::context::trim_context;

// Re-exports
pub use fallback::{FallbackCascade, FallbackRule, UNKNOWN_ANSWER};
pub use genapi::{GenApiClient, GenOutcome, GenRequest, RetryPolicy};
pub use postprocess::{clean_refs, looks_unknown};

// ============================================================================
// Prompts
// ============================================================================

/// 고정 시스템 프롬프트
///
/// 컨텍스트 한정 답변, 패러프레이즈 매핑, 고정 "모름" 문구,
/// 대괄호 인용 금지, 시간 비교 금지를 강제합니다.
const SYSTEM_PROMPT: &str = "Ты — русскоязычный специалист поддержки. Отвечай коротко и предметно, \
используя ТОЛЬКО факты из контекста. Если формулировка вопроса отличается, \
но в контексте есть близкие правила (например, «возврат средств» ↔ «возврат товара»), \
применяй их и прямо говори, что возврат средств происходит по правилам возврата товара. \
Не вставляй в текст ответа ссылки/цитаты в квадратных скобках ([1], [2] и т. п.) — выводи чистый текст. \
Если в контексте нет информации — отвечай: «Я не знаю.» \
Не делай сравнений «быстрее/дольше/сроки», если в контексте нет явных данных о времени.";

// ============================================================================
// Generator
// ============================================================================

/// 답변 생성기
pub struct Generator {
    client: GenApiClient,
    cascade: FallbackCascade,
    max_context_chars: usize,
    max_fragment_chars: usize,
}

impl Generator {
    /// 구성 요소 직접 주입 생성자
    pub fn new(client: GenApiClient, max_context_chars: usize, max_fragment_chars: usize) -> Self {
        Self {
            client,
            cascade: FallbackCascade::default(),
            max_context_chars,
            max_fragment_chars,
        }
    }

    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = GenApiClient::new(
            settings.genapi_url.clone(),
            settings.genapi_key.clone(),
            settings.request_timeout(),
        )?;
        Ok(Self::new(
            client,
            settings.max_context_chars,
            settings.max_fragment_chars,
        ))
    }

    /// 질문에 답하기
    ///
    /// 1. 컨텍스트를 예산에 맞게 자르고 번호 블록으로 렌더링
    /// 2. 원격 생성 서비스 호출 (재시도 포함)
    /// 3. "모름" 판정 시 폴백 캐스케이드
    /// 4. 참조 마커 제거 후 반환
    pub async fn ask(&self, question: &str, context: &[String]) -> String {
        let safe_ctx = trim_context(context, self.max_context_chars, self.max_fragment_chars);

        // 번호는 모델의 앵커일 뿐, 출력에는 금지됨 (시스템 프롬프트)
        let ctx_block = safe_ctx
            .iter()
            .enumerate()
            .map(|(i, frag)| format!("[{}] {}", i + 1, frag))
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Контекст:\n{ctx_block}\n\nВопрос пользователя: {question}\nОтвет (без ссылок в квадратных скобках):"
        );

        let request = GenRequest::chat(SYSTEM_PROMPT.to_string(), user_prompt);
        let answer = self.client.call(&request).await.into_answer();

        if looks_unknown(&answer) {
            tracing::info!(
                answer_chars = answer.chars().count(),
                "model gave up, composing fallback answer"
            );
            return clean_refs(&self.cascade.compose(question, &safe_ctx));
        }

        clean_refs(&answer)
    }
}

// ============================================================================
// Tests
// ============================================================================
