//! 렉시컬 인덱스 어댑터 - BM25 Okapi 스코어러
//!
//! 인덱서가 저장한 코퍼스 번들을 로드해 쿼리 토큰에 대한
//! 문서별 BM25 스코어를 계산합니다. 통계(idf, 문서 길이)는
//! 로드 시 한 번 복원되며 이후 읽기 전용입니다.
//! 토크나이저는 인덱서와 동일해야 합니다: 소문자화 후
//! 영숫자/공백 외 문자를 공백으로 치환하고 공백 분리.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// BM25 Okapi 파라미터 (rank_bm25 기본값)
const K1: f32 = 1.5;
const B: f32 = 0.75;
const EPSILON: f32 = 0.25;

// ============================================================================
// LexicalIndex Trait
// ============================================================================

/// 렉시컬 인덱스 트레이트
///
/// 쿼리 토큰을 받아 코퍼스 전체에 대한 문서별 스코어를 반환합니다.
/// 상위 후보 선별은 퓨전 엔진의 역할입니다.
pub trait LexicalIndex: Send + Sync {
    /// 문서별 스코어 (코퍼스 전체, id 정렬)
    fn scores(&self, query_tokens: &[String]) -> Vec<f32>;

    /// 코퍼스 문서 수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

/// 쿼리/코퍼스 공용 토크나이저
///
/// 영숫자·공백 외 문자는 공백 치환, 전체 소문자화, 공백 분리.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() || c.is_whitespace() {
            for lc in c.to_lowercase() {
                cleaned.push(lc);
            }
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

// ============================================================================
// Bm25Index
// ============================================================================

/// BM25 코퍼스 번들 아티팩트
#[derive(Debug, Deserialize)]
struct Bm25Bundle {
    /// "Вопрос:\nОтвет:" 텍스트, 메타와 동일 정렬
    corpus: Vec<String>,
}

/// BM25 Okapi 스코어러
pub struct Bm25Index {
    /// 문서별 용어 빈도
    doc_freqs: Vec<HashMap<String, u32>>,
    /// 용어별 idf (음수 idf는 epsilon 보정됨)
    idf: HashMap<String, f32>,
    /// 문서별 토큰 수
    doc_len: Vec<usize>,
    /// 평균 문서 길이
    avgdl: f32,
}

impl Bm25Index {
    /// JSON 번들 아티팩트에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read BM25 artifact: {}", path.display()))?;
        let bundle: Bm25Bundle = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse BM25 artifact: {}", path.display()))?;
        Ok(Self::from_corpus(&bundle.corpus))
    }

    /// 코퍼스 텍스트로 직접 생성
    pub fn from_corpus(corpus: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = corpus.iter().map(|doc| tokenize(doc)).collect();

        let doc_len: Vec<usize> = tokenized.iter().map(Vec::len).collect();
        let total_tokens: usize = doc_len.iter().sum();
        let avgdl = if tokenized.is_empty() {
            0.0
        } else {
            total_tokens as f32 / tokenized.len() as f32
        };

        let mut doc_freqs: Vec<HashMap<String, u32>> = Vec::with_capacity(tokenized.len());
        let mut nd: HashMap<String, u32> = HashMap::new();
        for tokens in &tokenized {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *nd.entry(term.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let idf = compute_idf(&nd, tokenized.len());

        Self {
            doc_freqs,
            idf,
            doc_len,
            avgdl,
        }
    }
}

/// idf 계산 (rank_bm25 BM25Okapi 방식)
///
/// idf = ln(N - nd + 0.5) - ln(nd + 0.5),
/// 음수 idf는 평균 idf의 epsilon 배로 하한 보정.
fn compute_idf(nd: &HashMap<String, u32>, doc_count: usize) -> HashMap<String, f32> {
    let n = doc_count as f32;
    let mut idf: HashMap<String, f32> = HashMap::with_capacity(nd.len());
    let mut idf_sum = 0.0f32;
    let mut negative: Vec<&String> = Vec::new();

    for (term, &freq) in nd {
        let value = (n - freq as f32 + 0.5).ln() - (freq as f32 + 0.5).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term);
        }
        idf.insert(term.clone(), value);
    }

    if !idf.is_empty() {
        let average_idf = idf_sum / idf.len() as f32;
        let eps = EPSILON * average_idf;
        for term in negative {
            idf.insert(term.clone(), eps);
        }
    }

    idf
}

impl LexicalIndex for Bm25Index {
    fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.doc_freqs.len()];
        if self.avgdl <= 0.0 {
            return scores;
        }

        for (i, freqs) in self.doc_freqs.iter().enumerate() {
            let dl = self.doc_len[i] as f32;
            let norm = K1 * (1.0 - B + B * dl / self.avgdl);
            for token in query_tokens {
                let tf = *freqs.get(token).unwrap_or(&0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let idf = *self.idf.get(token).unwrap_or(&0.0);
                scores[i] += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }

        scores
    }

    fn len(&self) -> usize {
        self.doc_freqs.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
