//! 폴백 컴포저 - 규칙 기반 답변 합성 캐스케이드
//!
//! 모델이 "모름"을 반환했을 때 검색된 컨텍스트에서 규칙으로
//! 답변을 합성합니다. 고정 우선순위로 평가되며 전 과정이
//! 순수 함수입니다: I/O 없음, 같은 입력이면 바이트 단위로
//! 동일한 출력.
//!
//! 순서: 비교 → 환불 → 교환 → 미배송 → 제네릭(항상 답함).

use std::sync::LazyLock;

use regex::Regex;

/// 제네릭 폴백이 돌려주는 고정 문구
pub const UNKNOWN_ANSWER: &str = "Я не знаю.";

/// "Вопрос: ..." 부분 (비탐욕, 다국어 마커 허용)
static QUESTION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:Вопрос|Question):\s*(.+?)(?:\n(?:Ответ|Answer):|$)").unwrap()
});

/// "Ответ: ..." 부분
static ANSWER_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(?:Ответ|Answer):\s*(.+)$").unwrap());

// ============================================================================
// FallbackRule Trait
// ============================================================================

/// 폴백 규칙 트레이트
///
/// `None`은 "이 규칙은 해당 없음"이며 다음 규칙으로 넘어갑니다.
/// "답을 못 찾음"과 혼동하지 않습니다.
pub trait FallbackRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// 질문과 컨텍스트로 답변 합성 시도
    fn try_answer(&self, question: &str, context: &[String]) -> Option<String>;
}

// ============================================================================
// Cascade
// ============================================================================

/// 고정 순서 폴백 캐스케이드
pub struct FallbackCascade {
    rules: Vec<Box<dyn FallbackRule>>,
}

impl Default for FallbackCascade {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(CompareRule),
                Box::new(RefundRule),
                Box::new(ExchangeRule),
                Box::new(NotDeliveredRule),
                Box::new(GenericRule),
            ],
        }
    }
}

impl FallbackCascade {
    /// 첫 번째로 매치된 규칙의 답변
    ///
    /// 제네릭 규칙이 항상 답하므로 결과는 언제나 비어 있지 않습니다.
    pub fn compose(&self, question: &str, context: &[String]) -> String {
        for rule in &self.rules {
            if let Some(answer) = rule.try_answer(question, context) {
                tracing::info!(rule = rule.name(), "fallback rule composed the answer");
                return answer;
            }
        }
        // 제네릭 규칙 덕분에 도달 불가, 방어적 고정 문구
        UNKNOWN_ANSWER.to_string()
    }
}

// ============================================================================
// QA Splitting
// ============================================================================

/// 프래그먼트를 (질문, 답변)으로 분리
///
/// "Вопрос: ...\nОтвет: ..." 규약 기준. 마커가 없으면 빈 문자열.
pub fn split_qa(fragment: &str) -> (String, String) {
    let question = QUESTION_PART
        .captures(fragment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let answer = ANSWER_PART
        .captures(fragment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    (question, answer)
}

/// 답변 부분이 있으면 그것, 없으면 프래그먼트 전체
fn answer_or_whole(fragment: &str) -> String {
    let (_, answer) = split_qa(fragment);
    if answer.is_empty() {
        fragment.trim().to_string()
    } else {
        answer
    }
}

/// 소문자 haystack에 needle 중 하나라도 포함되는지
fn contains_any(haystack_lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack_lower.contains(n))
}

/// 끝 마침표 정리 후 하나만 붙이기
fn with_period(text: &str) -> String {
    format!("{}.", text.trim_end_matches('.'))
}

/// 프래그먼트에서 키워드가 걸리는 첫 답변 텍스트 추출
///
/// 키워드 검사는 질문+답변을 합친 소문자 텍스트 기준.
fn find_fact(context: &[String], keywords: &[&str]) -> Option<String> {
    for fragment in context {
        let (q, a) = split_qa(fragment);
        let combined = format!("{q}\n{a}").to_lowercase();
        if contains_any(&combined, keywords) {
            return Some(answer_or_whole(fragment));
        }
    }
    None
}

// ============================================================================
// Keyword Sets
// ============================================================================

const REFUND_KEYWORDS: [&str; 5] = ["возврат", "вернуть", "вернете", "вернуть товар", "refund"];
const EXCHANGE_KEYWORDS: [&str; 3] = ["обмен", "обменять", "exchange"];
const NOT_DELIVERED_KEYWORDS: [&str; 5] = [
    "не приш",
    "неполуч",
    "пропал заказ",
    "not delivered",
    "didn't arrive",
];

// ============================================================================
// Rules
// ============================================================================

/// 비교 질문("что быстрее") 규칙
///
/// 코퍼스에는 처리 시간 데이터가 없으므로, 비교를 지어내는 대신
/// 환불/교환 사실을 나열하고 시간 데이터 부재를 명시합니다.
struct CompareRule;

impl FallbackRule for CompareRule {
    fn name(&self) -> &'static str {
        "compare"
    }

    fn try_answer(&self, question: &str, context: &[String]) -> Option<String> {
        let q = question.to_lowercase();
        if !contains_any(&q, &["быстрее", "дольше", "что быстрее", "faster", "slower"]) {
            return None;
        }

        let refund = find_fact(context, &["возврат", "вернуть", "refund"]);
        let exchange = find_fact(context, &EXCHANGE_KEYWORDS);
        if refund.is_none() && exchange.is_none() {
            return None;
        }

        let mut parts = vec!["В базе нет данных о скорости («быстрее/дольше»).".to_string()];
        if let Some(text) = refund {
            parts.push(format!("Возврат: {}", with_period(&text)));
        }
        if let Some(text) = exchange {
            parts.push(format!("Обмен: {}", with_period(&text)));
        }
        Some(parts.join(" ").trim().to_string())
    }
}

/// 환불 질문 규칙
struct RefundRule;

impl FallbackRule for RefundRule {
    fn name(&self) -> &'static str {
        "refund"
    }

    fn try_answer(&self, question: &str, context: &[String]) -> Option<String> {
        let q = question.to_lowercase();
        if !q.contains("возврат") && !q.contains("refund") {
            return None;
        }

        let refund = find_fact(context, &REFUND_KEYWORDS)?;
        let exchange = find_fact(context, &EXCHANGE_KEYWORDS);
        let not_delivered = find_fact(context, &NOT_DELIVERED_KEYWORDS);

        let mut parts = vec![
            "Возврат средств происходит по правилам возврата товара.".to_string(),
            with_period(&refund),
        ];
        if let Some(text) = exchange {
            parts.push(format!(
                "Обмен возможен при соблюдении условий: {}",
                with_period(&text)
            ));
        }
        if let Some(text) = not_delivered {
            if contains_any(&q, &["заказ", "достав", "order", "delivery"]) {
                parts.push(format!(
                    "Если заказ не пришёл — действуйте так: {}",
                    with_period(&text)
                ));
            }
        }
        Some(parts.join(" ").trim().to_string())
    }
}

/// 교환 질문 규칙
struct ExchangeRule;

impl FallbackRule for ExchangeRule {
    fn name(&self) -> &'static str {
        "exchange"
    }

    fn try_answer(&self, question: &str, context: &[String]) -> Option<String> {
        let q = question.to_lowercase();
        if !q.contains("обмен") && !q.contains("exchange") {
            return None;
        }

        for fragment in context {
            // 이 규칙은 프래그먼트 전체 텍스트로 게이트
            if contains_any(&fragment.to_lowercase(), &["обмен", "exchange"]) {
                let text = answer_or_whole(fragment);
                return Some(
                    format!(
                        "Обмен возможен при соблюдении условий: {}",
                        with_period(&text)
                    )
                    .trim()
                    .to_string(),
                );
            }
        }
        None
    }
}

/// 미배송 질문 규칙
struct NotDeliveredRule;

impl FallbackRule for NotDeliveredRule {
    fn name(&self) -> &'static str {
        "not-delivered"
    }

    fn try_answer(&self, question: &str, context: &[String]) -> Option<String> {
        let q = question.to_lowercase();
        if !contains_any(
            &q,
            &[
                "не приш",
                "не получил",
                "пропал",
                "not delivered",
                "didn't arrive",
                "не дош",
            ],
        ) {
            return None;
        }

        for fragment in context {
            if contains_any(
                &fragment.to_lowercase(),
                &[
                    "не приш",
                    "свяжитесь с поддержкой",
                    "номер заказа",
                    "not delivered",
                    "support",
                ],
            ) {
                let text = answer_or_whole(fragment);
                return Some(
                    format!(
                        "Если заказ не пришёл — свяжитесь с поддержкой и укажите номер заказа: {}",
                        with_period(&text)
                    )
                    .trim()
                    .to_string(),
                );
            }
        }
        None
    }
}

/// 제네릭 캐치올 규칙 - 캐스케이드 종료 보장
struct GenericRule;

impl FallbackRule for GenericRule {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn try_answer(&self, _question: &str, _context: &[String]) -> Option<String> {
        Some(UNKNOWN_ANSWER.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
