//! 설정 모듈 - 환경변수 기반 서비스 설정
//!
//! 모든 설정은 시작 시 한 번 읽어 불변 `Settings` 구조체로 만들고,
//! 각 컴포넌트 생성자에 전달합니다. 비즈니스 로직 안에서
//! 환경변수를 직접 조회하지 않습니다.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};

/// GenAPI 기본 엔드포인트 (gpt-4o 네트워크)
const DEFAULT_GENAPI_URL: &str = "https://api.gen-api.ru/api/v1/networks/gpt-4o";

// ============================================================================
// Settings
// ============================================================================

/// 서비스 전체 설정
///
/// 환경변수 → 필드 매핑은 `from_env()` 참조.
#[derive(Debug, Clone)]
pub struct Settings {
    /// 생성 서비스(GenAPI) 엔드포인트 URL
    pub genapi_url: String,
    /// GenAPI 인증 키. 없으면 네트워크 호출 없이 오류 답변으로 대체
    pub genapi_key: Option<String>,
    /// 덴스 벡터 인덱스 아티팩트 경로
    pub index_path: PathBuf,
    /// id 정렬 메타 레코드 아티팩트 경로
    pub meta_path: PathBuf,
    /// BM25 코퍼스 번들 아티팩트 경로
    pub bm25_path: PathBuf,
    /// 덴스 스코어 가중치 (1.0 = 덴스만, 0.0 = BM25만)
    pub hybrid_alpha: f32,
    /// 신호당 후보 풀 크기
    pub faiss_k: usize,
    /// 생성기에 전달할 최종 프래그먼트 수
    pub top_k: usize,
    /// GenAPI 호출당 타임아웃 (초)
    pub request_timeout_sec: u64,
    /// 프래그먼트 하나의 최대 문자 수
    pub max_fragment_chars: usize,
    /// 전체 컨텍스트 최대 문자 수
    pub max_context_chars: usize,
    /// HTTP 서버 바인드 주소
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            genapi_url: DEFAULT_GENAPI_URL.to_string(),
            genapi_key: None,
            index_path: PathBuf::from("./faq_index.json"),
            meta_path: PathBuf::from("./faq_meta.json"),
            bm25_path: PathBuf::from("./bm25_corpus.json"),
            hybrid_alpha: 0.6,
            faiss_k: 50,
            top_k: 5,
            request_timeout_sec: 60,
            max_fragment_chars: 800,
            max_context_chars: 600,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Settings {
    /// 환경변수에서 설정 로드
    ///
    /// 미설정 변수는 기본값 유지, 파싱 불가 값은 시작 오류.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(url) = env_opt("GENAPI_URL") {
            settings.genapi_url = url;
        }
        settings.genapi_key = env_opt("GENAPI_KEY");

        if let Some(path) = env_opt("INDEX_PATH") {
            settings.index_path = PathBuf::from(path);
        }
        if let Some(path) = env_opt("META_PATH") {
            settings.meta_path = PathBuf::from(path);
        }
        if let Some(path) = env_opt("BM25_PATH") {
            settings.bm25_path = PathBuf::from(path);
        }

        settings.hybrid_alpha = env_parsed("HYBRID_ALPHA", settings.hybrid_alpha)?;
        settings.faiss_k = env_parsed("FAISS_K", settings.faiss_k)?;
        settings.top_k = env_parsed("TOP_K", settings.top_k)?;
        settings.request_timeout_sec =
            env_parsed("REQUEST_TIMEOUT_SEC", settings.request_timeout_sec)?;
        settings.max_fragment_chars =
            env_parsed("MAX_FRAGMENT_CHARS", settings.max_fragment_chars)?;
        settings.max_context_chars =
            env_parsed("MAX_CONTEXT_CHARS", settings.max_context_chars)?;

        if let Some(addr) = env_opt("BIND_ADDR") {
            settings.bind_addr = addr;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// 설정값 범위 검증
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            bail!(
                "HYBRID_ALPHA must be in [0, 1], got {}",
                self.hybrid_alpha
            );
        }
        if self.faiss_k == 0 || self.top_k == 0 {
            bail!("FAISS_K and TOP_K must be positive");
        }
        Ok(())
    }

    /// GenAPI 호출당 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

// ============================================================================
// Env Helpers
// ============================================================================

/// 환경변수 조회 (빈 문자열은 미설정 취급)
fn env_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// 환경변수 파싱 (미설정이면 기본값, 파싱 실패면 오류)
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env_opt(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(e) => bail!("Invalid value for {}: {:?} ({})", key, raw, e),
        },
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.hybrid_alpha, 0.6);
        assert_eq!(s.faiss_k, 50);
        assert_eq!(s.top_k, 5);
        assert_eq!(s.request_timeout_sec, 60);
        assert_eq!(s.max_fragment_chars, 800);
        assert_eq!(s.max_context_chars, 600);
        assert!(s.genapi_key.is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_alpha_range() {
        let mut s = Settings::default();
        s.hybrid_alpha = 1.5;
        assert!(s.validate().is_err());

        s.hybrid_alpha = -0.1;
        assert!(s.validate().is_err());

        s.hybrid_alpha = 0.0;
        assert!(s.validate().is_ok());
        s.hybrid_alpha = 1.0;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_positive_k() {
        let mut s = Settings::default();
        s.faiss_k = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_env_parsed_invalid_number() {
        std::env::set_var("SUPPORT_RAG_TEST_BAD_NUM", "abc");
        let result: Result<usize> = env_parsed("SUPPORT_RAG_TEST_BAD_NUM", 7);
        assert!(result.is_err());
        std::env::remove_var("SUPPORT_RAG_TEST_BAD_NUM");
    }

    #[test]
    fn test_env_parsed_default_when_unset() {
        std::env::remove_var("SUPPORT_RAG_TEST_UNSET");
        let value: usize = env_parsed("SUPPORT_RAG_TEST_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_opt_empty_is_none() {
        std::env::set_var("SUPPORT_RAG_TEST_EMPTY", "  ");
        assert!(env_opt("SUPPORT_RAG_TEST_EMPTY").is_none());
        std::env::remove_var("SUPPORT_RAG_TEST_EMPTY");
    }
}
