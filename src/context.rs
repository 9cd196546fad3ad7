//! 컨텍스트 포매터 - 레코드를 길이 제한 프래그먼트로 렌더링
//!
//! 프래그먼트 형식은 인덱서의 코퍼스 텍스트와 동일한
//! "Вопрос: ...\nОтвет: ..." 규약을 따릅니다. 폴백 규칙의
//! QA 분리와 프롬프트 구성이 모두 이 규약에 의존합니다.

use crate::retrieval::Record;

/// 잘림 표시 문자
const ELLIPSIS: char = '…';

// ============================================================================
// Formatting
// ============================================================================

/// 문자 수 제한 자르기 (잘리면 말줄임표 추가)
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push(ELLIPSIS);
    cut
}

/// 레코드 하나를 컨텍스트 프래그먼트로 렌더링
///
/// 답변만 `limit` 문자로 잘립니다. 빈 필드는 빈 문자열 그대로.
pub fn format_fragment(record: &Record, limit: usize) -> String {
    let q = record.question_ru.trim();
    let a = truncate_chars(record.answer_ru.trim(), limit);
    format!("Вопрос: {q}\nОтвет: {a}")
}

/// 프래그먼트 목록을 프롬프트 예산에 맞게 자르기
///
/// 순서 보존. 각 프래그먼트는 먼저 `max_one` 문자로, 이어서
/// 남은 전체 예산으로 잘립니다. 빈 결과는 버리고, 예산이
/// 소진되면 순회를 멈춥니다. 결과 문자 수 합은 `max_total`을
/// 넘지 않습니다.
pub fn trim_context(fragments: &[String], max_total: usize, max_one: usize) -> Vec<String> {
    let mut safe = Vec::new();
    let mut total = 0usize;

    for fragment in fragments {
        let mut frag: String = fragment.chars().take(max_one).collect();
        let mut frag_len = frag.chars().count();
        if total + frag_len > max_total {
            frag = frag.chars().take(max_total - total).collect();
            frag_len = frag.chars().count();
        }
        if !frag.is_empty() {
            total += frag_len;
            safe.push(frag);
        }
        if total >= max_total {
            break;
        }
    }

    safe
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_chars("короткий", 100), "короткий");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        let cut = truncate_chars("длинный ответ про возврат", 7);
        assert_eq!(cut, "длинный…");
        assert_eq!(cut.chars().count(), 8);
    }

    #[test]
    fn test_format_fragment_convention() {
        let record = Record::new("Как вернуть товар?", "В течение 14 дней.");
        let frag = format_fragment(&record, 800);
        assert_eq!(frag, "Вопрос: Как вернуть товар?\nОтвет: В течение 14 дней.");
    }

    #[test]
    fn test_format_fragment_truncates_answer() {
        let record = Record::new("q", "a".repeat(900));
        let frag = format_fragment(&record, 800);
        // "Ответ: " 이후 800자 + 말줄임표
        assert!(frag.ends_with('…'));
        assert!(frag.chars().count() < 900);
    }

    #[test]
    fn test_format_fragment_missing_fields() {
        let record = Record::new("", "");
        assert_eq!(format_fragment(&record, 800), "Вопрос: \nОтвет: ");
    }

    #[test]
    fn test_trim_context_respects_total_budget() {
        let fragments = vec!["а".repeat(500), "б".repeat(500), "в".repeat(500)];
        let trimmed = trim_context(&fragments, 600, 800);

        let total: usize = trimmed.iter().map(|f| f.chars().count()).sum();
        assert!(total <= 600);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].chars().count(), 500);
        assert_eq!(trimmed[1].chars().count(), 100);
    }

    #[test]
    fn test_trim_context_caps_each_fragment_first() {
        let fragments = vec!["x".repeat(1000)];
        let trimmed = trim_context(&fragments, 600, 800);
        // 프래그먼트 한도 800보다 전체 예산 600이 먼저 걸림
        assert_eq!(trimmed[0].chars().count(), 600);

        let trimmed = trim_context(&fragments, 5000, 800);
        assert_eq!(trimmed[0].chars().count(), 800);
    }

    #[test]
    fn test_trim_context_drops_empty_fragments() {
        let fragments = vec!["".to_string(), "текст".to_string()];
        let trimmed = trim_context(&fragments, 600, 800);
        assert_eq!(trimmed, vec!["текст".to_string()]);
    }

    #[test]
    fn test_trim_context_stops_when_budget_spent() {
        let fragments = vec!["a".repeat(600), "never reached".to_string()];
        let trimmed = trim_context(&fragments, 600, 800);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn test_trim_context_preserves_order() {
        let fragments = vec!["первый".to_string(), "второй".to_string()];
        let trimmed = trim_context(&fragments, 600, 800);
        assert_eq!(trimmed, fragments);
    }
}
