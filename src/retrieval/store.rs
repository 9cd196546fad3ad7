//! 메타 스토어 - id 정렬 FAQ 레코드
//!
//! 지식베이스 레코드는 외부 인덱서가 만든 JSON 배열이며,
//! 배열 위치가 곧 문서 id입니다 (덴스 인덱스/BM25 코퍼스와 동일 정렬).
//! 로드 후에는 읽기 전용입니다.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Types
// ============================================================================

/// FAQ 레코드
///
/// `question_ru`/`answer_ru` 외의 필드는 그대로 보존합니다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// 질문 텍스트
    #[serde(default)]
    pub question_ru: String,
    /// 답변 텍스트
    #[serde(default)]
    pub answer_ru: String,
    /// 나머지 필드 (불투명)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Record {
    /// 질문/답변만으로 레코드 생성
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question_ru: question.into(),
            answer_ru: answer.into(),
            extra: serde_json::Map::new(),
        }
    }
}

// ============================================================================
// MetaStore
// ============================================================================

/// id 정렬 레코드 목록
#[derive(Debug, Clone)]
pub struct MetaStore {
    records: Vec<Record>,
}

impl MetaStore {
    /// JSON 아티팩트에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read meta artifact: {}", path.display()))?;
        let records: Vec<Record> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse meta artifact: {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    /// 레코드 목록으로 직접 생성
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// id로 레코드 조회
    pub fn get(&self, id: usize) -> Option<&Record> {
        self.records.get(id)
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_preserves_order_and_extra_fields() {
        let json = r#"[
            {"question_ru": "Как вернуть товар?", "answer_ru": "В течение 14 дней.", "category": "returns"},
            {"question_ru": "Как обменять товар?", "answer_ru": "При наличии чека."}
        ]"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let store = MetaStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().question_ru, "Как вернуть товар?");
        assert_eq!(
            store.get(0).unwrap().extra.get("category").unwrap(),
            "returns"
        );
        assert_eq!(store.get(1).unwrap().answer_ru, "При наличии чека.");
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_load_missing_fields_default_to_empty() {
        let json = r#"[{"category": "misc"}]"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let store = MetaStore::load(file.path()).unwrap();
        assert_eq!(store.get(0).unwrap().question_ru, "");
        assert_eq!(store.get(0).unwrap().answer_ru, "");
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(MetaStore::load(file.path()).is_err());
    }
}
