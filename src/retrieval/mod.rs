//! Retrieval 모듈 - 하이브리드 검색 계층
//!
//! - store: id 정렬 FAQ 메타 레코드
//! - dense: 내적 기반 벡터 인덱스 어댑터
//! - lexical: BM25 Okapi 스코어러 어댑터
//! - fusion: 두 신호의 정규화·선형 결합 (핵심)

mod dense;
mod fusion;
mod lexical;
mod store;

// Re-exports
pub use dense::{dot, normalize_l2, DenseIndex, FlatVectorIndex};
pub use fusion::HybridRetriever;
pub use lexical::{tokenize, Bm25Index, LexicalIndex};
pub use store::{MetaStore, Record};
