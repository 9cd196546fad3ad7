//! 답변 후처리 - "모름" 감지기와 참조 마커 클리너
//!
//! 감지기는 분류 모델이 아니라 의도적으로 싼 어휘 휴리스틱입니다.
//! 오탐/미탐은 결정성과 지연 0을 위한 트레이드오프로 수용합니다.

use std::sync::LazyLock;

use regex::Regex;

/// 이 길이 미만의 답변은 내용 없는 것으로 간주 (문자 수)
const MIN_ANSWER_CHARS: usize = 15;

/// 모델이 "포기"했음을 나타내는 문구 (소문자 비교)
const GIVE_UP_PHRASES: [&str; 5] = [
    "я не знаю",
    "не знаю",
    "insufficient",
    "no context",
    "cannot answer",
];

/// 대괄호 인용 마커: [1], [ 2 ], [1, 2] 등
static REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\d+(?:\s*,\s*\d+)*\s*\]").unwrap());

/// 2개 이상 연속 공백
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// Unknown-Answer Detector
// ============================================================================

/// 생성된 답변이 "모름"에 해당하는지 판정
///
/// 빈 텍스트, 15자 미만, 포기 문구 포함이면 true.
pub fn looks_unknown(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return true;
    }
    t.chars().count() < MIN_ANSWER_CHARS || GIVE_UP_PHRASES.iter().any(|p| t.contains(p))
}

// ============================================================================
// Reference Cleaner
// ============================================================================

/// 대괄호 인용 마커 제거 + 공백 정규화
///
/// 멱등: clean_refs(clean_refs(x)) == clean_refs(x).
pub fn clean_refs(text: &str) -> String {
    let without_refs = REF_PATTERN.replace_all(text, "");
    let collapsed = WHITESPACE_RUN.replace_all(&without_refs, " ");
    collapsed.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
