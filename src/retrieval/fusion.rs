//! 스코어 퓨전 엔진 - 덴스 + BM25 하이브리드 검색
//!
//! 두 신호를 각각 최대값으로 정규화한 뒤 선형 결합합니다:
//! fused = alpha * dense_norm + (1 - alpha) * lexical_norm.
//! 한쪽 신호에만 등장한 문서는 빠진 쪽 기여가 0일 뿐,
//! 전체 스코어가 0이 되지는 않습니다.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;

use super::dense::DenseIndex;
use super::lexical::{tokenize, LexicalIndex};
use super::store::{MetaStore, Record};

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 요청 간 공유되는 상태는 읽기 전용 인덱스 핸들뿐입니다.
pub struct HybridRetriever {
    meta: MetaStore,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    /// 덴스 가중치 (0.0 ~ 1.0)
    alpha: f32,
    /// 신호당 후보 풀 크기
    faiss_k: usize,
}

impl HybridRetriever {
    pub fn new(
        meta: MetaStore,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        alpha: f32,
        faiss_k: usize,
    ) -> Self {
        Self {
            meta,
            dense,
            lexical,
            alpha,
            faiss_k,
        }
    }

    /// 하이브리드 검색
    ///
    /// 어댑터 오류는 요청 실패로 전파됩니다 (생성 경로와 달리
    /// 문자열 답변으로 흡수하지 않음).
    ///
    /// # Arguments
    /// * `query` - 사용자 질문
    /// * `k` - 반환할 최종 레코드 수
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Record>> {
        // 1. 덴스 후보
        let dense_hits = self.dense.search(query, self.faiss_k).await?;
        let dense_norm = normalize_by_max(&dense_hits);

        // 2. BM25 - 전체 코퍼스 스코어에서 자체 top-N 선별
        let all_scores = self.lexical.scores(&tokenize(query));
        let lexical_hits = top_n(&all_scores, self.faiss_k);
        // 정규화 분모는 코퍼스 전체 최대값 (top-N에 argmax가 포함되므로 동일값)
        let lexical_norm = normalize_by_max(&lexical_hits);

        // 3. id 합집합 위에서 선형 결합
        let mut fused: Vec<(usize, f32)> = Vec::with_capacity(dense_norm.len() + lexical_norm.len());
        let mut seen: HashSet<usize> = HashSet::new();
        for &id in dense_norm.keys().chain(lexical_norm.keys()) {
            if !seen.insert(id) {
                continue;
            }
            let s_d = dense_norm.get(&id).copied().unwrap_or(0.0);
            let s_l = lexical_norm.get(&id).copied().unwrap_or(0.0);
            fused.push((id, self.alpha * s_d + (1.0 - self.alpha) * s_l));
        }

        // 4. 퓨전 스코어 내림차순, 동점은 id 오름차순 (결정적 순서)
        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        fused.truncate(k);

        tracing::debug!(
            candidates = fused.len(),
            "hybrid search fused dense + lexical signals"
        );

        // 5. 레코드 변환 (인덱스와 메타는 시작 시 길이 검증됨)
        Ok(fused
            .into_iter()
            .filter_map(|(id, _)| self.meta.get(id).cloned())
            .collect())
    }
}

// ============================================================================
// Score Helpers
// ============================================================================

/// 최대값 정규화
///
/// 최대값이 0 이하이면 전부 0 처리합니다 (0 나눗셈 방지,
/// 전부 음수인 퇴화 스코어 세트에 보상 금지).
fn normalize_by_max(hits: &[(usize, f32)]) -> HashMap<usize, f32> {
    let max = hits
        .iter()
        .map(|&(_, s)| s)
        .fold(f32::NEG_INFINITY, f32::max);

    hits.iter()
        .map(|&(id, s)| {
            let norm = if max > 0.0 { s / max } else { 0.0 };
            (id, norm)
        })
        .collect()
}

/// 전체 스코어 배열에서 상위 n개 (id, score) 선별
///
/// 스코어 내림차순, 동점은 id 오름차순.
fn top_n(scores: &[f32], n: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    indexed.truncate(n);
    indexed
}

// ============================================================================
// Tests
// ============================================================================
