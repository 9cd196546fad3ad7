//! 덴스 인덱스 어댑터 - 내적 기반 벡터 검색
//!
//! 인덱서가 저장한 id 정렬 임베딩 행렬(L2 정규화됨)을 로드해
//! 쿼리 임베딩과의 내적으로 정확 top-k를 계산합니다.
//! ANN 재구현은 범위 밖이며, 코퍼스 규모(FAQ 수백 건)에서는
//! 평면 스캔으로 충분합니다.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;

// ============================================================================
// DenseIndex Trait
// ============================================================================

/// 덴스 인덱스 트레이트
///
/// 쿼리 문자열을 받아 (문서 id, 유사도) 쌍을 유사도 내림차순으로 반환합니다.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// 상위 k개 후보 검색
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>>;

    /// 인덱싱된 문서 수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// FlatVectorIndex
// ============================================================================

/// 평면 벡터 인덱스
///
/// 임베딩 행렬은 아티팩트에 L2 정규화되어 저장되므로
/// 내적이 곧 코사인 유사도입니다. 쿼리 벡터만 여기서 정규화합니다.
pub struct FlatVectorIndex {
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl FlatVectorIndex {
    /// JSON 아티팩트에서 임베딩 행렬만 읽기
    ///
    /// 임베더는 행렬 차원을 따라야 하므로, 시작 시 행렬을 먼저 읽어
    /// 차원을 확정한 뒤 임베더를 구성할 때 사용합니다.
    pub fn load_matrix(path: &Path) -> Result<Vec<Vec<f32>>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector artifact: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse vector artifact: {}", path.display()))
    }

    /// JSON 아티팩트에서 로드
    pub fn load(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::from_vectors(Self::load_matrix(path)?, embedder)
    }

    /// 임베딩 행렬로 직접 생성
    pub fn from_vectors(
        vectors: Vec<Vec<f32>>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if let Some(first) = vectors.first() {
            let dim = first.len();
            if dim == 0 {
                anyhow::bail!("Vector artifact contains empty vectors");
            }
            if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
                anyhow::bail!(
                    "Vector artifact is ragged: row 0 has {} dims, row {} has {}",
                    dim,
                    bad,
                    vectors[bad].len()
                );
            }
        }
        Ok(Self { vectors, embedder })
    }

    /// 행렬 차원 (빈 인덱스는 0)
    pub fn dimension(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl DenseIndex for FlatVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let mut qvec = self.embedder.embed(query).await?;
        if qvec.len() != self.dimension() {
            anyhow::bail!(
                "Query embedding dimension {} does not match index dimension {}",
                qvec.len(),
                self.dimension()
            );
        }
        normalize_l2(&mut qvec);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id, dot(&qvec, v)))
            .collect();
        // 유사도 내림차순, 동점은 id 오름차순
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

// ============================================================================
// Vector Utilities
// ============================================================================

/// 내적 계산
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// 벡터를 제자리에서 L2 정규화 (영벡터는 그대로)
pub fn normalize_l2(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::StubEmbedder;
    use std::io::Write;

    /// 고정 쿼리 벡터를 돌려주는 임베더
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_inner_product() {
        let vectors = vec![
            vec![0.0, 1.0],  // id 0: 직교
            vec![1.0, 0.0],  // id 1: 일치
            vec![0.6, 0.8],  // id 2: 중간
        ];
        let embedder = Arc::new(FixedEmbedder(vec![1.0, 0.0]));
        let index = FlatVectorIndex::from_vectors(vectors, embedder).unwrap();

        let hits = index.search("query", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_truncates_to_k() {
        let vectors = vec![vec![1.0, 0.0]; 10];
        let embedder = Arc::new(FixedEmbedder(vec![1.0, 0.0]));
        let index = FlatVectorIndex::from_vectors(vectors, embedder).unwrap();

        let hits = index.search("query", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        // 동점은 id 오름차순
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
        assert_eq!(hits[2].0, 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let vectors = vec![vec![1.0, 0.0, 0.0]];
        let embedder = Arc::new(StubEmbedder::new(8));
        let index = FlatVectorIndex::from_vectors(vectors, embedder).unwrap();

        assert!(index.search("query", 1).await.is_err());
    }

    #[test]
    fn test_ragged_matrix_is_error() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0]];
        let embedder = Arc::new(StubEmbedder::new(2));
        assert!(FlatVectorIndex::from_vectors(vectors, embedder).is_err());
    }

    #[test]
    fn test_load_from_json_artifact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[1.0, 0.0], [0.0, 1.0]]").unwrap();

        let embedder = Arc::new(StubEmbedder::new(2));
        let index = FlatVectorIndex::load(file.path(), embedder).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_normalize_l2() {
        let mut v = vec![3.0, 4.0];
        normalize_l2(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize_l2(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
