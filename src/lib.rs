//! support-rag - 하이브리드 검색 기반 고객지원 QA 서비스
//!
//! Dense 벡터 검색 + BM25 렉시컬 검색을 스코어 퓨전으로 결합하고,
//! 원격 생성 서비스(GenAPI)로 답변을 만든 뒤 규칙 기반 폴백
//! 캐스케이드로 열화 처리하는 RAG 파이프라인입니다.

pub mod config;
pub mod context;
pub mod embedding;
pub mod generator;
pub mod retrieval;
pub mod server;

// Re-exports
pub use config::Settings;
pub use context::{format_fragment, trim_context, truncate_chars};
pub use embedding::{get_api_key, EmbeddingProvider, GeminiEmbedding};
pub use generator::{
    clean_refs, looks_unknown, FallbackCascade, FallbackRule, GenApiClient, GenOutcome,
    GenRequest, Generator, RetryPolicy, UNKNOWN_ANSWER,
};
pub use retrieval::{
    tokenize, Bm25Index, DenseIndex, FlatVectorIndex, HybridRetriever, LexicalIndex, MetaStore,
    Record,
};
pub use server::{create_router, AppState, AskRequest, AskResponse};
